//! Element format tags.
//!
//! [`ElementFormat`] is a selector, not a value container: it tells the
//! buffer quantizer which round-trip to run. Discriminants follow the ggml
//! type ids so that tags read from a model file map directly onto it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QuantizationError, Result};

/// ggml type id of 32-bit float.
pub const GGML_TYPE_F32: u32 = 0;
/// ggml type id of IEEE binary16.
pub const GGML_TYPE_F16: u32 = 1;
/// ggml type id of bfloat16.
pub const GGML_TYPE_BF16: u32 = 30;

/// ggml type names by id. Ids 4 and 5 were retired upstream.
const GGML_TYPE_NAMES: &[(u32, &str)] = &[
    (0, "f32"),
    (1, "f16"),
    (2, "q4_0"),
    (3, "q4_1"),
    (6, "q5_0"),
    (7, "q5_1"),
    (8, "q8_0"),
    (9, "q8_1"),
    (10, "q2_K"),
    (11, "q3_K"),
    (12, "q4_K"),
    (13, "q5_K"),
    (14, "q6_K"),
    (15, "q8_K"),
    (16, "iq2_xxs"),
    (17, "iq2_xs"),
    (18, "iq3_xxs"),
    (19, "iq1_s"),
    (20, "iq4_nl"),
    (21, "iq3_s"),
    (22, "iq2_s"),
    (23, "iq4_xs"),
    (24, "i8"),
    (25, "i16"),
    (26, "i32"),
    (27, "i64"),
    (28, "f64"),
    (29, "iq1_m"),
    (30, "bf16"),
    (34, "tq1_0"),
    (35, "tq2_0"),
];

/// Storage / target format of a tensor's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ElementFormat {
    /// IEEE binary32. Fake-quantizing to it is a no-op.
    FullPrecision32,
    /// IEEE binary16 (5-bit exponent, 10-bit mantissa).
    Half16,
    /// Upper 16 bits of a binary32 (bf16 layout), produced by truncation.
    TruncatedHalf16,
    /// Any other ggml type id. No codec exists for these.
    Unsupported(u32),
}

impl ElementFormat {
    /// Map a raw ggml type id onto a format tag.
    pub const fn from_ggml_type(id: u32) -> Self {
        match id {
            GGML_TYPE_F32 => Self::FullPrecision32,
            GGML_TYPE_F16 => Self::Half16,
            GGML_TYPE_BF16 => Self::TruncatedHalf16,
            other => Self::Unsupported(other),
        }
    }

    /// The ggml type id of this tag.
    pub const fn ggml_type(self) -> u32 {
        match self {
            Self::FullPrecision32 => GGML_TYPE_F32,
            Self::Half16 => GGML_TYPE_F16,
            Self::TruncatedHalf16 => GGML_TYPE_BF16,
            Self::Unsupported(id) => id,
        }
    }

    /// Whether a round-trip codec exists for this format.
    pub const fn is_supported(self) -> bool {
        matches!(self, Self::FullPrecision32 | Self::Half16 | Self::TruncatedHalf16)
    }

    /// Bytes per element for the formats with a fixed element width.
    pub const fn element_size(self) -> Option<usize> {
        match self {
            Self::FullPrecision32 => Some(4),
            Self::Half16 | Self::TruncatedHalf16 => Some(2),
            Self::Unsupported(_) => None,
        }
    }

    /// The ggml type name, or `type#<id>` for ids ggml does not name.
    pub fn name(self) -> String {
        let id = self.ggml_type();
        GGML_TYPE_NAMES
            .iter()
            .find(|(known, _)| *known == id)
            .map(|(_, name)| (*name).to_string())
            .unwrap_or_else(|| format!("type#{id}"))
    }
}

impl fmt::Display for ElementFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for ElementFormat {
    type Err = QuantizationError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        match lower.as_str() {
            "f32" | "fp32" | "float32" => return Ok(Self::FullPrecision32),
            "f16" | "fp16" | "half" => return Ok(Self::Half16),
            "bf16" | "bfloat16" => return Ok(Self::TruncatedHalf16),
            _ => {}
        }

        if let Some(id) = lower.strip_prefix("type#") {
            return id
                .parse::<u32>()
                .map(Self::from_ggml_type)
                .map_err(|_| QuantizationError::InvalidFormatName(s.to_string()));
        }

        GGML_TYPE_NAMES
            .iter()
            .find(|(_, name)| name.eq_ignore_ascii_case(trimmed))
            .map(|(id, _)| Self::from_ggml_type(*id))
            .ok_or_else(|| QuantizationError::InvalidFormatName(s.to_string()))
    }
}

impl TryFrom<String> for ElementFormat {
    type Error = QuantizationError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ElementFormat> for String {
    fn from(value: ElementFormat) -> Self {
        value.name()
    }
}

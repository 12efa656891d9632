//! Which tensors, and which layers, a policy touches.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{QuantizationError, Result};
use crate::naming::{BlockConvention, NamingConvention};

/// Component name of the feed-forward normalization weight.
pub const FFN_NORM_PATTERN: &str = "ffn_norm";

/// Layer index parsed from `name` under the `blk.<index>.<pattern>` convention.
///
/// Succeeds only when the component after the index is exactly `pattern`.
pub fn extract_layer(name: &str, pattern: &str) -> Option<u32> {
    extract_layer_with(&BlockConvention, name, pattern)
}

/// [`extract_layer`] under an arbitrary naming convention.
pub fn extract_layer_with(
    convention: &dyn NamingConvention,
    name: &str,
    pattern: &str,
) -> Option<u32> {
    convention
        .parse(name)
        .filter(|parsed| parsed.component == pattern)
        .map(|parsed| parsed.block_index)
}

/// Loose pre-filter: `pattern` occurs somewhere in `name`.
pub fn matches(name: &str, pattern: &str) -> bool {
    name.contains(pattern)
}

/// Whether a tensor's extracted layer falls under `target`.
///
/// `target == None` means all layers, and admits names whose layer could not
/// be extracted. Otherwise the extracted index must equal the target.
pub fn is_target_layer(extracted: Option<u32>, target: Option<u32>) -> bool {
    match target {
        None => true,
        Some(target) => extracted == Some(target),
    }
}

/// Restriction to one model layer, or to none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerSelector {
    /// `None` selects every layer.
    pub target_layer: Option<u32>,
}

impl LayerSelector {
    pub const fn all() -> Self {
        Self { target_layer: None }
    }

    pub const fn only(layer: u32) -> Self {
        Self { target_layer: Some(layer) }
    }

    /// Build from the signed convention where any negative value means all layers.
    pub fn from_raw(raw: i64) -> Result<Self> {
        if raw < 0 {
            return Ok(Self::all());
        }
        u32::try_from(raw)
            .map(Self::only)
            .map_err(|_| QuantizationError::InvalidLayer(raw.to_string()))
    }

    /// The signed form: `-1` for all layers.
    pub fn to_raw(self) -> i64 {
        self.target_layer.map_or(-1, i64::from)
    }

    pub fn admits(self, extracted: Option<u32>) -> bool {
        is_target_layer(extracted, self.target_layer)
    }
}

impl fmt::Display for LayerSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target_layer {
            Some(layer) => write!(f, "{layer}"),
            None => f.write_str("all"),
        }
    }
}

impl FromStr for LayerSelector {
    type Err = QuantizationError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::all());
        }
        let raw: i64 =
            trimmed.parse().map_err(|_| QuantizationError::InvalidLayer(s.to_string()))?;
        Self::from_raw(raw)
    }
}

/// Pattern + layer restriction + naming convention, applied together.
#[derive(Debug, Clone)]
pub struct TensorSelector {
    pattern: String,
    layers: LayerSelector,
    convention: Arc<dyn NamingConvention>,
}

impl TensorSelector {
    /// Selector over `blk.<index>.<pattern>` names.
    pub fn new(pattern: impl Into<String>, layers: LayerSelector) -> Self {
        Self { pattern: pattern.into(), layers, convention: Arc::new(BlockConvention) }
    }

    pub fn with_convention(mut self, convention: Arc<dyn NamingConvention>) -> Self {
        self.convention = convention;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn layers(&self) -> LayerSelector {
        self.layers
    }

    /// Layer index of `name` if it parses with this selector's pattern.
    pub fn layer_of(&self, name: &str) -> Option<u32> {
        extract_layer_with(self.convention.as_ref(), name, &self.pattern)
    }

    /// `matches` pre-filter, then structured parse, then layer check.
    pub fn selects(&self, name: &str) -> bool {
        matches(name, &self.pattern) && self.layers.admits(self.layer_of(name))
    }
}

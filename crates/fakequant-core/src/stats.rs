//! Before/after comparison of a fake-quantized buffer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QuantizationError, Result};

/// Differences below this are not counted as changes.
pub const CHANGE_THRESHOLD: f32 = 1e-8;

/// Added to the denominator of relative differences.
const RELATIVE_EPSILON: f64 = 1e-8;

/// Numerical effect of fake quantization on one buffer.
///
/// Half-precision overflow and non-finite inputs make some fields infinite
/// or NaN. Those serialize as the strings `"inf"`, `"-inf"` and `"NaN"` so
/// the JSON form reads back into the same values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationStats {
    pub name: String,
    pub elements: usize,
    /// Elements whose absolute difference exceeds [`CHANGE_THRESHOLD`].
    pub changed: usize,
    #[serde(with = "float_repr")]
    pub max_abs_diff: f64,
    #[serde(with = "float_repr")]
    pub mean_abs_diff: f64,
    #[serde(with = "float_repr")]
    pub max_rel_diff: f64,
    #[serde(with = "float_repr")]
    pub mean_rel_diff: f64,
    #[serde(with = "float_repr::range")]
    pub original_range: (f32, f32),
    #[serde(with = "float_repr::range")]
    pub quantized_range: (f32, f32),
}

/// Float fields as JSON numbers when finite, as strings otherwise.
mod float_repr {
    use serde::de::{self, Deserializer};
    use serde::{Deserialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    fn label(v: f64) -> &'static str {
        if v.is_nan() {
            "NaN"
        } else if v > 0.0 {
            "inf"
        } else {
            "-inf"
        }
    }

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() { s.serialize_f64(*v) } else { s.serialize_str(label(*v)) }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Repr::deserialize(d)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(text) => match text.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "NaN" => Ok(f64::NAN),
                other => Err(de::Error::invalid_value(
                    de::Unexpected::Str(other),
                    &"a number, \"inf\", \"-inf\" or \"NaN\"",
                )),
            },
        }
    }

    /// `(min, max)` pairs of `f32`.
    pub mod range {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        struct Bound(f32);

        impl Serialize for Bound {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                if self.0.is_finite() {
                    s.serialize_f32(self.0)
                } else {
                    s.serialize_str(super::label(f64::from(self.0)))
                }
            }
        }

        impl<'de> Deserialize<'de> for Bound {
            fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                super::deserialize(d).map(|v| Bound(v as f32))
            }
        }

        pub fn serialize<S: Serializer>(r: &(f32, f32), s: S) -> Result<S::Ok, S::Error> {
            (Bound(r.0), Bound(r.1)).serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<(f32, f32), D::Error> {
            let (lo, hi) = <(Bound, Bound)>::deserialize(d)?;
            Ok((lo.0, hi.0))
        }
    }
}

impl QuantizationStats {
    /// Compare `original` against its fake-quantized counterpart.
    pub fn compare(name: impl Into<String>, original: &[f32], quantized: &[f32]) -> Result<Self> {
        if original.len() != quantized.len() {
            return Err(QuantizationError::LengthMismatch {
                original: original.len(),
                quantized: quantized.len(),
            });
        }

        let name = name.into();
        if original.is_empty() {
            return Ok(Self {
                name,
                elements: 0,
                changed: 0,
                max_abs_diff: 0.0,
                mean_abs_diff: 0.0,
                max_rel_diff: 0.0,
                mean_rel_diff: 0.0,
                original_range: (0.0, 0.0),
                quantized_range: (0.0, 0.0),
            });
        }

        let mut changed = 0usize;
        let mut max_abs = 0.0f64;
        let mut sum_abs = 0.0f64;
        let mut max_rel = 0.0f64;
        let mut sum_rel = 0.0f64;

        for (&o, &q) in original.iter().zip(quantized) {
            let abs = (f64::from(o) - f64::from(q)).abs();
            let rel = abs / (f64::from(o).abs() + RELATIVE_EPSILON);
            if abs > f64::from(CHANGE_THRESHOLD) {
                changed += 1;
            }
            max_abs = max_abs.max(abs);
            max_rel = max_rel.max(rel);
            sum_abs += abs;
            sum_rel += rel;
        }

        let n = original.len() as f64;
        Ok(Self {
            name,
            elements: original.len(),
            changed,
            max_abs_diff: max_abs,
            mean_abs_diff: sum_abs / n,
            max_rel_diff: max_rel,
            mean_rel_diff: sum_rel / n,
            original_range: min_max(original),
            quantized_range: min_max(quantized),
        })
    }

    /// Fraction of elements that changed, in `[0, 1]`.
    pub fn changed_fraction(&self) -> f64 {
        if self.elements == 0 { 0.0 } else { self.changed as f64 / self.elements as f64 }
    }
}

fn min_max(values: &[f32]) -> (f32, f32) {
    values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

impl fmt::Display for QuantizationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} changed, max abs {:.2e}, mean abs {:.2e}, max rel {:.2}%, mean rel {:.2}%",
            self.name,
            self.changed,
            self.elements,
            self.max_abs_diff,
            self.mean_abs_diff,
            self.max_rel_diff * 100.0,
            self.mean_rel_diff * 100.0,
        )
    }
}

//! Explicit, per-call application of fake quantization to one tensor.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::buffer::quantize_in_place;
use crate::coverage::select_count;
use crate::error::Result;
use crate::format::ElementFormat;
use crate::stats::QuantizationStats;
use crate::tensor::TensorHandle;

/// Per-call parameters for [`apply`]. Not retained after the call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantizationRequest {
    pub enabled: bool,
    pub target_format: ElementFormat,
    /// Fraction of leading elements to rewrite; see [`select_count`].
    pub coverage: f32,
    /// Ask [`apply_with_report`] for a before/after comparison.
    pub compare_mode: bool,
}

impl QuantizationRequest {
    /// Enabled request covering the whole tensor.
    pub fn new(target_format: ElementFormat) -> Self {
        Self { enabled: true, target_format, coverage: 1.0, compare_mode: false }
    }

    pub fn with_coverage(mut self, coverage: f32) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn with_compare_mode(mut self, compare_mode: bool) -> Self {
        self.compare_mode = compare_mode;
        self
    }
}

impl Default for QuantizationRequest {
    fn default() -> Self {
        Self {
            enabled: false,
            target_format: ElementFormat::TruncatedHalf16,
            coverage: 1.0,
            compare_mode: false,
        }
    }
}

/// Why [`apply`] left a tensor alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    Disabled,
    NotFullPrecision,
    NoBuffer,
    ZeroCoverage,
}

/// What [`apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyOutcome {
    /// The first `elements` values were rewritten in place.
    Quantized { elements: usize },
    Skipped(SkipReason),
}

impl ApplyOutcome {
    pub fn is_quantized(self) -> bool {
        matches!(self, Self::Quantized { .. })
    }
}

/// Number of leading elements `request` would rewrite, or why it would not.
fn selected_prefix<T: TensorHandle + ?Sized>(
    tensor: &mut T,
    request: &QuantizationRequest,
) -> std::result::Result<usize, SkipReason> {
    if !request.enabled {
        return Err(SkipReason::Disabled);
    }
    if tensor.element_type() != ElementFormat::FullPrecision32 {
        return Err(SkipReason::NotFullPrecision);
    }
    let count = tensor.element_count();
    let available = tensor.data_mut().ok_or(SkipReason::NoBuffer)?.len();
    match select_count(count, request.coverage).min(available) {
        0 => Err(SkipReason::ZeroCoverage),
        n => Ok(n),
    }
}

/// Fake-quantize the leading `coverage` fraction of `tensor` in place.
///
/// Disabled requests, non-`f32` tensors, tensors without a buffer and zero
/// coverage are no-ops reported through [`ApplyOutcome::Skipped`]. The only
/// error is [`UnsupportedFormat`](crate::QuantizationError::UnsupportedFormat),
/// raised before the buffer is touched. Does not log.
pub fn apply<T: TensorHandle + ?Sized>(
    tensor: &mut T,
    request: &QuantizationRequest,
) -> Result<ApplyOutcome> {
    let n = match selected_prefix(tensor, request) {
        Ok(n) => n,
        Err(reason) => return Ok(ApplyOutcome::Skipped(reason)),
    };
    let Some(data) = tensor.data_mut() else {
        return Ok(ApplyOutcome::Skipped(SkipReason::NoBuffer));
    };
    quantize_in_place(&mut data[..n], request.target_format)?;
    Ok(ApplyOutcome::Quantized { elements: n })
}

/// Result of [`apply_with_report`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub outcome: ApplyOutcome,
    /// Present when the request asked for comparison and something was rewritten.
    pub stats: Option<QuantizationStats>,
}

/// [`apply`], plus a before/after comparison when `request.compare_mode` is set.
pub fn apply_with_report<T: TensorHandle + ?Sized>(
    tensor: &mut T,
    request: &QuantizationRequest,
) -> Result<ApplyReport> {
    let snapshot = if request.compare_mode {
        selected_prefix(tensor, request)
            .ok()
            .and_then(|n| tensor.data_mut().map(|data| data[..n].to_vec()))
    } else {
        None
    };

    let outcome = apply(tensor, request)?;

    let stats = match (outcome, snapshot) {
        (ApplyOutcome::Quantized { elements }, Some(original)) => {
            let name = tensor.name().unwrap_or("<unnamed>").to_string();
            let quantized = tensor.data_mut().map(|data| &data[..elements]).unwrap_or_default();
            let stats = QuantizationStats::compare(name, &original, quantized)?;
            info!(format = %request.target_format, "fake quantization {stats}");
            Some(stats)
        }
        _ => None,
    };

    Ok(ApplyReport { outcome, stats })
}

//! Fake quantization for f32 tensors.
//!
//! Simulates lower-precision storage without changing it: values are
//! rewritten in place with their round-trip through a 16-bit format, so the
//! tensor stays `f32` but carries the rounding error a real bf16/f16 tensor
//! would have. Useful for measuring the numerical impact of quantizing a
//! specific tensor or layer before committing to a storage format.
//!
//! Two ways in:
//!
//! - **Explicit**: [`apply_fake_quantization`] with a [`QuantizationRequest`]
//!   (enable flag, target format, coverage fraction).
//! - **Out-of-band**: configure a [`PolicyStore`] (or the process-wide one via
//!   [`set_global_policy`]) and let a computation stage call
//!   [`apply_global_policy_to_buffer`] on its own output. This path only
//!   touches feed-forward normalization tensors and always covers the whole
//!   buffer.
//!
//! ```
//! use fakequant_core::{ElementFormat, HostTensor, QuantizationRequest, apply_fake_quantization};
//!
//! let mut tensor = HostTensor::new("blk.0.ffn_norm", vec![1.234_567_9, 3.141_592_7]);
//! let request = QuantizationRequest::new(ElementFormat::TruncatedHalf16);
//! apply_fake_quantization(&mut tensor, &request).unwrap();
//! assert_eq!(tensor.data[0], 1.234375);
//! ```

pub mod apply;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod coverage;
pub mod error;
pub mod format;
pub mod naming;
pub mod policy;
pub mod selector;
pub mod stats;
pub mod tensor;

pub use apply::{ApplyOutcome, ApplyReport, QuantizationRequest, SkipReason, apply_with_report};
pub use buffer::{quantize_in_place, type_supported};
pub use config::FakeQuantConfig;
pub use coverage::select_count;
pub use error::{QuantizationError, Result};
pub use format::ElementFormat;
pub use naming::{BlockConvention, GraphNodeConvention, NamingConvention, TensorName};
pub use policy::{GlobalPolicy, PolicyCounters, PolicyStore};
pub use selector::{
    FFN_NORM_PATTERN, LayerSelector, TensorSelector, extract_layer, is_target_layer, matches,
};
pub use stats::QuantizationStats;
pub use tensor::{HostTensor, TensorHandle, TensorView};

/// Fake-quantize a runtime tensor as `request` describes.
///
/// See [`apply::apply`] for the skip rules.
pub fn apply_fake_quantization<T: TensorHandle + ?Sized>(
    tensor: &mut T,
    request: &QuantizationRequest,
) -> Result<ApplyOutcome> {
    apply::apply(tensor, request)
}

/// Fake-quantize the first `count` elements of `buffer` (clamped to its length).
pub fn quantize_buffer(buffer: &mut [f32], count: usize, format: ElementFormat) -> Result<()> {
    let n = count.min(buffer.len());
    quantize_in_place(&mut buffer[..n], format)
}

/// Configure the process-wide policy.
pub fn set_global_policy(enabled: bool, format: ElementFormat, target_layer: Option<u32>) {
    PolicyStore::global().set(enabled, format, target_layer);
}

/// Reset the process-wide policy to disabled.
pub fn clear_global_policy() {
    PolicyStore::global().clear();
}

/// Whether the process-wide policy selects `tensor_name` as a feed-forward
/// normalization tensor.
pub fn global_policy_applies(tensor_name: &str) -> bool {
    PolicyStore::global().applies_to(tensor_name)
}

/// Rewrite the first `count` elements of `buffer` (clamped to its length)
/// under the process-wide policy, if it selects `tensor_name`.
///
/// Returns whether the buffer was rewritten.
pub fn apply_global_policy_to_buffer(
    buffer: &mut [f32],
    count: usize,
    tensor_name: &str,
) -> Result<bool> {
    let n = count.min(buffer.len());
    PolicyStore::global().apply_to_buffer(&mut buffer[..n], tensor_name)
}

//! In-place fake quantization of contiguous `f32` runs.

use crate::codec::{round_trip_half, round_trip_truncated};
use crate::error::{QuantizationError, Result};
use crate::format::ElementFormat;

/// Element-wise round-trip selected by a target format.
type RoundTrip = fn(f32) -> f32;

/// Resolve the round-trip for `format`.
///
/// `Ok(None)` means the format is full precision and nothing needs to happen.
fn round_trip_for(format: ElementFormat) -> Result<Option<RoundTrip>> {
    match format {
        ElementFormat::FullPrecision32 => Ok(None),
        ElementFormat::Half16 => Ok(Some(round_trip_half)),
        ElementFormat::TruncatedHalf16 => Ok(Some(round_trip_truncated)),
        ElementFormat::Unsupported(_) => Err(QuantizationError::UnsupportedFormat { format }),
    }
}

/// Replace every element of `buffer` with its round-trip through `format`.
///
/// An empty buffer is a no-op whatever the format. `FullPrecision32` is a
/// no-op. An unsupported format fails before any element is touched. The
/// element count never changes.
pub fn quantize_in_place(buffer: &mut [f32], format: ElementFormat) -> Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }

    let Some(round_trip) = round_trip_for(format)? else {
        return Ok(());
    };

    for value in buffer.iter_mut() {
        *value = round_trip(*value);
    }

    Ok(())
}

/// Whether [`quantize_in_place`] accepts `format`.
pub fn type_supported(format: ElementFormat) -> bool {
    round_trip_for(format).is_ok()
}

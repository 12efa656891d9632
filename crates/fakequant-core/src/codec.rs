//! Bit-level conversions between `f32` and the two 16-bit representations.
//!
//! All functions are pure and defined for every input bit pattern.
//!
//! - Truncated half (bf16 layout): keep the upper 16 bits of the binary32
//!   pattern. This truncates, it does not round, so positive values lose
//!   magnitude. NaNs are the one exception: a NaN whose payload lives only
//!   in the low 16 bits would truncate to infinity, so NaNs are quieted
//!   (top mantissa bit forced) and keep their sign.
//! - IEEE half (binary16): round-to-nearest-even encode with subnormals,
//!   infinities and NaN, via the `half` crate.

use half::f16;

/// Mask of the bits that survive a truncated-half round-trip.
pub const TRUNCATED_HALF_MASK: u32 = 0xFFFF_0000;

/// Quiet-NaN bit in the truncated-half layout.
const TRUNCATED_QUIET_BIT: u16 = 0x0040;

/// Encode `value` as a truncated half by keeping its upper 16 bits.
#[inline]
pub fn to_truncated16(value: f32) -> u16 {
    let bits = value.to_bits();
    let upper = (bits >> 16) as u16;
    if value.is_nan() { upper | TRUNCATED_QUIET_BIT } else { upper }
}

/// Decode a truncated half by zero-filling the lower 16 bits.
#[inline]
pub fn from_truncated16(bits: u16) -> f32 {
    f32::from_bits(u32::from(bits) << 16)
}

/// Encode `value` as IEEE binary16, rounding to nearest even.
#[inline]
pub fn to_half16(value: f32) -> u16 {
    f16::from_f32(value).to_bits()
}

/// Decode an IEEE binary16 bit pattern. Exact for every input.
#[inline]
pub fn from_half16(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// `from_truncated16(to_truncated16(value))`.
#[inline]
pub fn round_trip_truncated(value: f32) -> f32 {
    from_truncated16(to_truncated16(value))
}

/// `from_half16(to_half16(value))`.
#[inline]
pub fn round_trip_half(value: f32) -> f32 {
    from_half16(to_half16(value))
}

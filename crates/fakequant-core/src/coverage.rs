//! Coverage fraction -> number of leading elements to rewrite.

/// Number of leading elements of a `total`-element buffer that a coverage
/// fraction selects.
///
/// - `coverage >= 1.0` selects everything.
/// - `0.0 < coverage < 1.0` selects `floor(coverage * total)`, always a
///   prefix of the buffer. This is not a representative sample: measurements
///   taken with partial coverage are biased toward the front of the tensor.
/// - `coverage <= 0.0` (and NaN) selects nothing.
///
/// The product is formed in `f32`, so a fraction such as `0.29` of 100
/// elements selects 29 rather than the 28 an exact product of the stored
/// `f32` value would give. Above 2^24 elements the count is only as precise
/// as `f32` allows.
pub fn select_count(total: usize, coverage: f32) -> usize {
    if coverage >= 1.0 {
        total
    } else if coverage > 0.0 {
        ((coverage * total as f32) as usize).min(total)
    } else {
        0
    }
}

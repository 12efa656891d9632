//! Error types for fake quantization.

use thiserror::Error;

use crate::format::ElementFormat;

/// Errors raised by the fake quantization engine and its configuration layer.
///
/// Only [`QuantizationError::UnsupportedFormat`] can come out of the
/// quantization path itself; every other condition on that path (empty
/// buffer, wrong tensor type, disabled request, non-matching name) is a
/// silent no-op.
#[non_exhaustive]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QuantizationError {
    /// The requested target format has no bit codec.
    #[error("fake quantization for type {format} not implemented")]
    UnsupportedFormat { format: ElementFormat },

    /// A user-supplied format name did not match any known type.
    #[error("unknown element format: {0:?}")]
    InvalidFormatName(String),

    /// A user-supplied layer selector could not be parsed.
    #[error("invalid layer selector: {0:?}")]
    InvalidLayer(String),

    /// A user-supplied coverage fraction could not be parsed.
    #[error("invalid coverage fraction: {0:?}")]
    InvalidCoverage(String),

    /// Comparison statistics were requested over buffers of different lengths.
    #[error("length mismatch: original has {original} elements, quantized has {quantized}")]
    LengthMismatch { original: usize, quantized: usize },
}

pub type Result<T> = std::result::Result<T, QuantizationError>;

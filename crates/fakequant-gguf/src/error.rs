use std::io;
use std::path::PathBuf;

use fakequant_core::QuantizationError;
use thiserror::Error;

/// Errors returned when reading or rewriting a GGUF file.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum GgufError {
    #[error("bad magic: {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("unsupported GGUF version: {0}")]
    UnsupportedVersion(u32),
    #[error("truncated file: need {needed} bytes at offset {offset}, file has {len}")]
    Truncated { offset: usize, needed: u64, len: usize },
    #[error("malformed file: {0}")]
    Malformed(&'static str),
    #[error("invalid KV type: {0}")]
    InvalidKvType(u32),
    #[error("string too large: {0} bytes")]
    StringTooLarge(u64),
    #[error("tensor {name} has {n_dims} dimensions, at most {max} supported")]
    TooManyDims { name: String, n_dims: u32, max: u32 },
    #[error("tensor {name} lies outside the file ({start}..{end} of {len} bytes)")]
    TensorOutOfBounds { name: String, start: u64, end: u64, len: usize },
    #[error("output {} is the input file", .0.display())]
    SameFile(PathBuf),
    #[error(transparent)]
    Quant(#[from] QuantizationError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, GgufError>;

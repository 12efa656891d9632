//! CLI command implementations

pub mod buffer;
pub mod gguf;
pub mod inspect;
pub mod verify;

pub use buffer::BufferCommand;
pub use gguf::GgufCommand;
pub use inspect::InspectCommand;
pub use verify::VerifyCommand;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Pretty-print `value` as JSON into `path`.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

//! Fake-quantize selected f32 tensors inside a GGUF model file.
//!
//! A minimal GGUF reader locates the tensor index; the rewriter copies the
//! model and replaces the payload of each selected f32 tensor with its
//! fake-quantized values, leaving every other byte untouched.
//!
//! # Example
//!
//! ```no_run
//! use fakequant_core::ElementFormat;
//! use fakequant_gguf::{TensorPlan, fake_quantize_gguf};
//!
//! let plan = TensorPlan::new("ffn_norm.weight", "0,1".parse().unwrap());
//! let stats = fake_quantize_gguf("model.gguf", "model.fq.gguf", &plan, ElementFormat::TruncatedHalf16)
//!     .unwrap();
//! for s in &stats {
//!     println!("{s}");
//! }
//! ```

pub mod error;
pub mod kv;
pub mod layout;
pub mod plan;
pub mod rewrite;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{GgufError, Result};
pub use kv::{GgufKv, GgufValue};
pub use layout::{GgufLayout, TensorInfo};
pub use plan::{LayerSet, TensorPlan};
pub use rewrite::{fake_quantize_gguf, list_tensors, read_layout};

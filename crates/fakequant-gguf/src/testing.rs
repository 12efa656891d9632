//! Synthetic GGUF files for tests and fixtures.

use std::io;
use std::path::Path;

use fakequant_core::codec::to_half16;
use fakequant_core::format::{GGML_TYPE_F16, GGML_TYPE_F32};

use crate::layout::DEFAULT_ALIGNMENT;

#[derive(Debug, Clone)]
struct PendingTensor {
    name: String,
    dims: Vec<u64>,
    ggml_type: u32,
    payload: Vec<u8>,
}

/// Writes a version-3 GGUF file with the given metadata and tensors.
#[derive(Debug, Clone)]
pub struct GgufBuilder {
    kvs: Vec<u8>,
    n_kv: u64,
    alignment: u64,
    tensors: Vec<PendingTensor>,
}

impl Default for GgufBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn push_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn pad_to(buf: &mut Vec<u8>, alignment: u64) {
    let alignment = alignment as usize;
    let padded = buf.len().div_ceil(alignment) * alignment;
    buf.resize(padded, 0);
}

impl GgufBuilder {
    pub fn new() -> Self {
        Self { kvs: Vec::new(), n_kv: 0, alignment: DEFAULT_ALIGNMENT, tensors: Vec::new() }
    }

    pub fn kv_string(mut self, key: &str, value: &str) -> Self {
        push_string(&mut self.kvs, key);
        self.kvs.extend_from_slice(&8u32.to_le_bytes());
        push_string(&mut self.kvs, value);
        self.n_kv += 1;
        self
    }

    pub fn kv_u32(mut self, key: &str, value: u32) -> Self {
        push_string(&mut self.kvs, key);
        self.kvs.extend_from_slice(&4u32.to_le_bytes());
        self.kvs.extend_from_slice(&value.to_le_bytes());
        self.n_kv += 1;
        self
    }

    pub fn architecture(self, arch: &str) -> Self {
        self.kv_string("general.architecture", arch)
    }

    /// Set `general.alignment`. `alignment` must be a power of two.
    pub fn alignment(mut self, alignment: u32) -> Self {
        self.alignment = u64::from(alignment);
        self.kv_u32("general.alignment", alignment)
    }

    /// Tensor with an arbitrary type id and payload.
    pub fn raw_tensor(mut self, name: &str, dims: &[u64], ggml_type: u32, payload: &[u8]) -> Self {
        self.tensors.push(PendingTensor {
            name: name.to_string(),
            dims: dims.to_vec(),
            ggml_type,
            payload: payload.to_vec(),
        });
        self
    }

    /// One-dimensional f32 tensor.
    pub fn f32_tensor(self, name: &str, values: &[f32]) -> Self {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.raw_tensor(name, &[values.len() as u64], GGML_TYPE_F32, &payload)
    }

    /// One-dimensional f16 tensor holding `values` rounded to binary16.
    pub fn f16_tensor(self, name: &str, values: &[f32]) -> Self {
        let payload: Vec<u8> = values.iter().flat_map(|&v| to_half16(v).to_le_bytes()).collect();
        self.raw_tensor(name, &[values.len() as u64], GGML_TYPE_F16, &payload)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::new();
        let mut offsets = Vec::with_capacity(self.tensors.len());
        for tensor in &self.tensors {
            pad_to(&mut data, self.alignment);
            offsets.push(data.len() as u64);
            data.extend_from_slice(&tensor.payload);
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"GGUF");
        out.extend_from_slice(&3u32.to_le_bytes());
        out.extend_from_slice(&(self.tensors.len() as u64).to_le_bytes());
        out.extend_from_slice(&self.n_kv.to_le_bytes());
        out.extend_from_slice(&self.kvs);
        for (tensor, offset) in self.tensors.iter().zip(offsets) {
            push_string(&mut out, &tensor.name);
            out.extend_from_slice(&(tensor.dims.len() as u32).to_le_bytes());
            for dim in &tensor.dims {
                out.extend_from_slice(&dim.to_le_bytes());
            }
            out.extend_from_slice(&tensor.ggml_type.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
        }
        pad_to(&mut out, self.alignment);
        out.extend_from_slice(&data);
        out
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        std::fs::write(path, self.build())
    }
}

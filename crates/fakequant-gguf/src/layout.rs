//! Header, metadata and tensor index of a GGUF file.

use std::ops::Range;

use fakequant_core::naming::{BlockConvention, NamingConvention};
use fakequant_core::ElementFormat;
use serde::{Deserialize, Serialize};

use crate::error::{GgufError, Result};
use crate::kv::{Cursor, GgufKv, read_kv};

/// The four-byte magic that every GGUF file starts with.
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";
/// Minimum supported GGUF version.
pub const GGUF_VERSION_MIN: u32 = 2;
/// Maximum supported GGUF version (inclusive).
pub const GGUF_VERSION_MAX: u32 = 3;
/// Data alignment when the file does not set `general.alignment`.
pub const DEFAULT_ALIGNMENT: u64 = 32;
/// ggml tensors have at most four dimensions.
pub const MAX_DIMS: u32 = 4;

const KEY_ARCHITECTURE: &str = "general.architecture";
const KEY_ALIGNMENT: &str = "general.alignment";

/// One entry of the tensor index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub name: String,
    pub dims: Vec<u64>,
    /// Raw ggml type id.
    pub ggml_type: u32,
    /// Byte offset relative to the start of the data section.
    pub offset: u64,
}

impl TensorInfo {
    /// Product of the dimensions, `None` on overflow.
    pub fn element_count(&self) -> Option<u64> {
        self.dims.iter().try_fold(1u64, |acc, &d| acc.checked_mul(d))
    }

    pub fn format(&self) -> ElementFormat {
        ElementFormat::from_ggml_type(self.ggml_type)
    }

    /// Payload size in bytes for f32, f16 and bf16 tensors; `None` for
    /// block-quantized types.
    pub fn byte_len(&self) -> Option<u64> {
        let size = self.format().element_size()? as u64;
        self.element_count()?.checked_mul(size)
    }

    /// Layer index under the `blk.<index>.<component>` naming.
    pub fn layer(&self) -> Option<u32> {
        BlockConvention.parse(&self.name).map(|parsed| parsed.block_index)
    }
}

/// Parsed structure of a GGUF file. Owns no file bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GgufLayout {
    pub version: u32,
    pub alignment: u64,
    pub architecture: Option<String>,
    pub metadata: Vec<GgufKv>,
    pub tensors: Vec<TensorInfo>,
    /// Absolute offset of the (aligned) data section.
    pub data_offset: u64,
}

fn align_up(pos: u64, alignment: u64) -> Option<u64> {
    pos.checked_add(alignment - 1).map(|p| p / alignment * alignment)
}

fn count(value: u64) -> usize {
    // Counts come from the file; cap the preallocation, not the count.
    usize::try_from(value).unwrap_or(usize::MAX).min(1024)
}

impl GgufLayout {
    /// Parse the header, every metadata KV and the tensor index of `data`,
    /// checking that every tensor payload of known size lies inside `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(data);

        let magic: [u8; 4] = r
            .take(4)?
            .try_into()
            .map_err(|_| GgufError::Malformed("short magic"))?;
        if magic != GGUF_MAGIC {
            return Err(GgufError::BadMagic(magic));
        }
        let version = r.u32()?;
        if !(GGUF_VERSION_MIN..=GGUF_VERSION_MAX).contains(&version) {
            return Err(GgufError::UnsupportedVersion(version));
        }
        let n_tensors = r.u64()?;
        let n_kv = r.u64()?;

        let mut metadata = Vec::with_capacity(count(n_kv));
        let mut architecture = None;
        let mut alignment = DEFAULT_ALIGNMENT;
        for _ in 0..n_kv {
            let kv = read_kv(&mut r)?;
            match kv.key.as_str() {
                KEY_ARCHITECTURE => architecture = kv.value.as_str().map(str::to_string),
                KEY_ALIGNMENT => {
                    if let Some(a) = kv.value.as_u64().filter(|a| a.is_power_of_two()) {
                        alignment = a;
                    }
                }
                _ => {}
            }
            metadata.push(kv);
        }

        let mut tensors = Vec::with_capacity(count(n_tensors));
        for _ in 0..n_tensors {
            let name = r.string()?;
            let n_dims = r.u32()?;
            if n_dims > MAX_DIMS {
                return Err(GgufError::TooManyDims { name, n_dims, max: MAX_DIMS });
            }
            let dims = (0..n_dims).map(|_| r.u64()).collect::<Result<Vec<_>>>()?;
            let ggml_type = r.u32()?;
            let offset = r.u64()?;
            tensors.push(TensorInfo { name, dims, ggml_type, offset });
        }

        let data_offset = align_up(r.position() as u64, alignment)
            .ok_or(GgufError::Malformed("data section offset overflows"))?;

        let layout = Self { version, alignment, architecture, metadata, tensors, data_offset };
        for tensor in &layout.tensors {
            layout.check_bounds(tensor, data.len())?;
        }
        Ok(layout)
    }

    fn check_bounds(&self, tensor: &TensorInfo, len: usize) -> Result<()> {
        let start = self.data_offset.checked_add(tensor.offset);
        let end = start.and_then(|s| s.checked_add(tensor.byte_len().unwrap_or(0)));
        match (start, end) {
            (Some(start), Some(end)) if end <= len as u64 => Ok(()),
            _ => Err(GgufError::TensorOutOfBounds {
                name: tensor.name.clone(),
                start: start.unwrap_or(u64::MAX),
                end: end.unwrap_or(u64::MAX),
                len,
            }),
        }
    }

    /// Absolute byte range of a tensor's payload, for types of known size.
    pub fn tensor_range(&self, tensor: &TensorInfo) -> Option<Range<usize>> {
        let start = usize::try_from(self.data_offset.checked_add(tensor.offset)?).ok()?;
        let len = usize::try_from(tensor.byte_len()?).ok()?;
        Some(start..start.checked_add(len)?)
    }

    pub fn tensor(&self, name: &str) -> Option<&TensorInfo> {
        self.tensors.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::GgufBuilder;

    #[test]
    fn parses_minimal_file() {
        let bytes = GgufBuilder::new()
            .architecture("llama")
            .f32_tensor("blk.0.ffn_norm.weight", &[1.0, 2.0, 3.0])
            .build();
        let layout = GgufLayout::parse(&bytes).unwrap();
        assert_eq!(layout.version, 3);
        assert_eq!(layout.architecture.as_deref(), Some("llama"));
        assert_eq!(layout.alignment, DEFAULT_ALIGNMENT);
        assert_eq!(layout.data_offset % DEFAULT_ALIGNMENT, 0);

        let tensor = layout.tensor("blk.0.ffn_norm.weight").unwrap();
        assert_eq!(tensor.element_count(), Some(3));
        assert_eq!(tensor.format(), ElementFormat::FullPrecision32);
        assert_eq!(tensor.byte_len(), Some(12));
        assert_eq!(tensor.layer(), Some(0));
        let range = layout.tensor_range(tensor).unwrap();
        assert_eq!(&bytes[range], &[1.0f32, 2.0, 3.0].map(f32::to_le_bytes).concat()[..]);
    }

    #[test]
    fn honors_explicit_alignment() {
        let bytes = GgufBuilder::new()
            .alignment(64)
            .f32_tensor("output_norm.weight", &[0.5; 4])
            .build();
        let layout = GgufLayout::parse(&bytes).unwrap();
        assert_eq!(layout.alignment, 64);
        assert_eq!(layout.data_offset % 64, 0);
    }

    #[test]
    fn block_quantized_tensor_has_no_byte_len() {
        let info = TensorInfo { name: "t".into(), dims: vec![32, 2], ggml_type: 2, offset: 0 };
        assert_eq!(info.element_count(), Some(64));
        assert_eq!(info.format(), ElementFormat::Unsupported(2));
        assert_eq!(info.byte_len(), None);
        assert_eq!(info.layer(), None);
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut bytes = GgufBuilder::new().build();
        bytes[0] = b'X';
        assert!(matches!(GgufLayout::parse(&bytes), Err(GgufError::BadMagic(_))));

        let mut bytes = GgufBuilder::new().build();
        bytes[4..8].copy_from_slice(&1u32.to_le_bytes());
        assert!(matches!(GgufLayout::parse(&bytes), Err(GgufError::UnsupportedVersion(1))));
    }

    #[test]
    fn rejects_tensor_past_end_of_file() {
        let mut bytes = GgufBuilder::new().f32_tensor("blk.0.ffn_norm.weight", &[1.0; 8]).build();
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(GgufLayout::parse(&bytes), Err(GgufError::TensorOutOfBounds { .. })));
    }

    #[test]
    fn rejects_truncated_index() {
        let bytes = GgufBuilder::new().f32_tensor("blk.0.ffn_norm.weight", &[1.0]).build();
        assert!(matches!(GgufLayout::parse(&bytes[..30]), Err(GgufError::Truncated { .. })));
    }

    proptest::proptest! {
        #[test]
        fn parse_never_panics_on_arbitrary_bytes(
            data in proptest::collection::vec(0u8..=255, 0..128)
        ) {
            let _ = GgufLayout::parse(&data);
        }

        #[test]
        fn parse_never_panics_after_valid_header(
            tail in proptest::collection::vec(0u8..=255, 0..96)
        ) {
            let mut data = b"GGUF".to_vec();
            data.extend_from_slice(&3u32.to_le_bytes());
            data.extend_from_slice(&1u64.to_le_bytes());
            data.extend_from_slice(&1u64.to_le_bytes());
            data.extend_from_slice(&tail);
            let _ = GgufLayout::parse(&data);
        }
    }
}

//! In-place fake quantization of tensors in a copy of a GGUF file.

use std::fs;
use std::io;
use std::path::Path;

use fakequant_core::{ElementFormat, QuantizationError, QuantizationStats, quantize_in_place};
use memmap2::{Mmap, MmapMut};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{GgufError, Result};
use crate::layout::{GgufLayout, TensorInfo};
use crate::plan::TensorPlan;

/// Memory-map `path` read-only and parse its layout.
pub fn read_layout(path: impl AsRef<Path>) -> Result<GgufLayout> {
    let file = fs::File::open(path.as_ref())?;
    // SAFETY: the mapping is read-only and dropped before returning.
    let mmap = unsafe { Mmap::map(&file) }?;
    GgufLayout::parse(&mmap[..])
}

/// The tensor index of the file at `path`.
pub fn list_tensors(path: impl AsRef<Path>) -> Result<Vec<TensorInfo>> {
    Ok(read_layout(path)?.tensors)
}

fn decode_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn encode_f32(values: &[f32], out: &mut [u8]) {
    for (chunk, v) in out.chunks_exact_mut(4).zip(values) {
        chunk.copy_from_slice(&v.to_le_bytes());
    }
}

/// Whether `output` already exists and is the same file as `input`.
fn is_same_file(input: &Path, output: &Path) -> io::Result<bool> {
    let out_meta = match fs::metadata(output) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    let in_meta = fs::metadata(input)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(in_meta.dev() == out_meta.dev() && in_meta.ino() == out_meta.ino())
    }
    #[cfg(not(unix))]
    {
        let _ = (in_meta, out_meta);
        Ok(fs::canonicalize(input)? == fs::canonicalize(output)?)
    }
}

/// Copy `input` to `output` and fake-quantize, inside the copy, every f32
/// tensor `plan` selects.
///
/// Selected tensors stored in any other type are skipped. Bytes outside the
/// rewritten payloads are left exactly as in `input`. Returns one
/// [`QuantizationStats`] per rewritten tensor, in file order.
///
/// The copy is built in a temporary file next to `output` and renamed over
/// it only once every tensor is written; on error `output` is not created
/// or replaced. `output` naming the input file is rejected.
pub fn fake_quantize_gguf(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    plan: &TensorPlan,
    format: ElementFormat,
) -> Result<Vec<QuantizationStats>> {
    let (input, output) = (input.as_ref(), output.as_ref());
    if !format.is_supported() {
        return Err(QuantizationError::UnsupportedFormat { format }.into());
    }

    if is_same_file(input, output)? {
        return Err(GgufError::SameFile(output.to_path_buf()));
    }

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let staging = NamedTempFile::new_in(dir)?;
    fs::copy(input, staging.path())?;
    // SAFETY: the staging file is private to this call and nothing else maps it.
    let mut mmap = unsafe { MmapMut::map_mut(staging.as_file()) }?;
    let layout = GgufLayout::parse(&mmap[..])?;

    let mut all_stats = Vec::new();
    for tensor in &layout.tensors {
        if !plan.selects(&tensor.name) {
            continue;
        }
        if tensor.format() != ElementFormat::FullPrecision32 {
            debug!(tensor = %tensor.name, ty = %tensor.format(), "skipping non-f32 tensor");
            continue;
        }
        let Some(range) = layout.tensor_range(tensor) else {
            debug!(tensor = %tensor.name, "skipping tensor with unrepresentable size");
            continue;
        };

        let payload = &mut mmap[range];
        let original = decode_f32(payload);
        let mut values = original.clone();
        quantize_in_place(&mut values, format)?;
        encode_f32(&values, payload);

        let stats = QuantizationStats::compare(tensor.name.as_str(), &original, &values)?;
        info!(format = %format, "{stats}");
        all_stats.push(stats);
    }

    mmap.flush()?;
    drop(mmap);
    staging.persist(output).map_err(|err| err.error)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        tensors = all_stats.len(),
        "fake quantization written"
    );
    Ok(all_stats)
}

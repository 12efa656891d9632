//! Fake quantization of a raw little-endian f32 file.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::Args;
use fakequant_core::{ElementFormat, HostTensor, QuantizationRequest, apply_with_report};
use tracing::info;

use super::write_json;

/// Buffer command arguments
#[derive(Args, Debug)]
pub struct BufferCommand {
    /// Raw little-endian f32 input
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the fake-quantized values
    #[arg(short, long)]
    pub output: PathBuf,

    /// Target format (f32, f16, bf16)
    #[arg(long, default_value = "bf16")]
    pub format: ElementFormat,

    /// Fraction of leading elements to rewrite
    #[arg(long, default_value_t = 1.0)]
    pub coverage: f32,

    /// Tensor name used in reports (defaults to the input file stem)
    #[arg(long)]
    pub name: Option<String>,

    /// Write the comparison statistics as JSON
    #[arg(long)]
    pub stats_output: Option<PathBuf>,
}

impl BufferCommand {
    pub fn execute(&self) -> Result<()> {
        let bytes = fs::read(&self.input)
            .with_context(|| format!("Failed to read {}", self.input.display()))?;
        ensure!(
            bytes.len() % 4 == 0,
            "{} is {} bytes, not a whole number of f32 values",
            self.input.display(),
            bytes.len()
        );
        let data: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let name = self.name.clone().unwrap_or_else(|| {
            self.input
                .file_stem()
                .map_or_else(|| "buffer".to_string(), |s| s.to_string_lossy().into_owned())
        });
        let mut tensor = HostTensor::new(name, data);
        let request = QuantizationRequest::new(self.format)
            .with_coverage(self.coverage)
            .with_compare_mode(true);
        let report = apply_with_report(&mut tensor, &request)?;
        info!(outcome = ?report.outcome, "buffer processed");

        let out: Vec<u8> = tensor.data.iter().flat_map(|v| v.to_le_bytes()).collect();
        fs::write(&self.output, out)
            .with_context(|| format!("Failed to write {}", self.output.display()))?;

        match &report.stats {
            Some(stats) => println!("{stats}"),
            None => println!("{:?}: nothing rewritten", report.outcome),
        }
        if let Some(path) = &self.stats_output {
            write_json(path, &report)?;
        }
        Ok(())
    }
}

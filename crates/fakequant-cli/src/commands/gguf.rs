//! Fake quantization of selected tensors in a GGUF model.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fakequant_core::ElementFormat;
use fakequant_gguf::plan::DEFAULT_PATTERN;
use fakequant_gguf::{LayerSet, TensorPlan, fake_quantize_gguf};
use tracing::warn;

use super::write_json;

/// GGUF command arguments
#[derive(Args, Debug)]
pub struct GgufCommand {
    /// Input model
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output model (a copy of the input with rewritten tensors)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Layers to rewrite: `all` or a list such as `0,1,2`
    #[arg(long, default_value = "all")]
    pub layers: LayerSet,

    /// Component after `blk.N.` to select
    #[arg(long, default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Target format (f32, f16, bf16)
    #[arg(long, default_value = "bf16")]
    pub format: ElementFormat,

    /// Write per-tensor statistics as JSON
    #[arg(long)]
    pub stats_output: Option<PathBuf>,
}

impl GgufCommand {
    pub fn execute(&self) -> Result<()> {
        let plan = TensorPlan::new(self.pattern.as_str(), self.layers.clone());
        let stats =
            fake_quantize_gguf(&self.input, &self.output, &plan, self.format).with_context(|| {
                format!("Failed to rewrite {} into {}", self.input.display(), self.output.display())
            })?;

        if stats.is_empty() {
            warn!(pattern = %self.pattern, layers = %self.layers, "no f32 tensor matched");
        }
        for s in &stats {
            println!("{s}");
        }
        println!("{} tensor(s) rewritten -> {}", stats.len(), self.output.display());

        if let Some(path) = &self.stats_output {
            write_json(path, &stats)?;
        }
        Ok(())
    }
}

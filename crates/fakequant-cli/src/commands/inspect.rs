//! Tensor listing for GGUF models.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fakequant_gguf::read_layout;
use serde::Serialize;

/// Inspect command arguments
#[derive(Args, Debug)]
pub struct InspectCommand {
    /// Model file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Only list tensors whose name contains this string
    #[arg(long)]
    pub filter: Option<String>,

    /// Output format as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct TensorRow<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    ty: String,
    dims: &'a [u64],
    elements: Option<u64>,
    layer: Option<u32>,
}

impl InspectCommand {
    pub fn execute(&self) -> Result<()> {
        let layout = read_layout(&self.input)
            .with_context(|| format!("Failed to read model: {}", self.input.display()))?;

        let rows: Vec<TensorRow<'_>> = layout
            .tensors
            .iter()
            .filter(|t| self.filter.as_deref().is_none_or(|f| t.name.contains(f)))
            .map(|t| TensorRow {
                name: &t.name,
                ty: t.format().name(),
                dims: &t.dims,
                elements: t.element_count(),
                layer: t.layer(),
            })
            .collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        println!(
            "GGUF v{} arch={} alignment={} tensors={}",
            layout.version,
            layout.architecture.as_deref().unwrap_or("unknown"),
            layout.alignment,
            layout.tensors.len()
        );
        println!("{:<40} {:<8} {:>12} {:>6}", "name", "type", "elements", "layer");
        for row in &rows {
            println!(
                "{:<40} {:<8} {:>12} {:>6}",
                row.name,
                row.ty,
                row.elements.map_or_else(|| "?".to_string(), |n| n.to_string()),
                row.layer.map_or_else(|| "-".to_string(), |l| l.to_string()),
            );
        }
        Ok(())
    }
}

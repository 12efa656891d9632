//! Self-check of the codecs, the naming conventions and a random tensor.

use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use clap::Args;
use fakequant_core::stats::CHANGE_THRESHOLD;
use fakequant_core::{
    BlockConvention, ElementFormat, GraphNodeConvention, HostTensor, NamingConvention,
    PolicyStore, QuantizationRequest, apply_with_report, quantize_in_place,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const REFERENCE: [f32; 5] = [1.234_567_9, -0.987_654_3, 0.000_123_456, -1000.123_5, 3.141_592_7];

const SAMPLE_NAMES: [&str; 6] = [
    "norm-0",
    "norm-21",
    "blk.5.ffn_norm",
    "blk.10.attn_norm",
    "output_norm",
    "some_other_tensor",
];

/// Verify command arguments
#[derive(Args, Debug)]
pub struct VerifyCommand {
    /// Elements in the random tensor
    #[arg(long, default_value_t = 1000)]
    pub samples: usize,

    /// Seed for the random tensor
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Target format (f32, f16, bf16)
    #[arg(long, default_value = "bf16")]
    pub format: ElementFormat,
}

impl VerifyCommand {
    pub fn execute(&self) -> Result<()> {
        self.check_reference_values()?;
        check_naming();
        self.check_random_tensor()
    }

    fn check_reference_values(&self) -> Result<()> {
        println!("Reference values ({}):", self.format);
        let mut quantized = REFERENCE;
        quantize_in_place(&mut quantized, self.format)?;
        for (orig, q) in REFERENCE.iter().zip(&quantized) {
            println!("  {orig:>16.9} -> {q:>16.9}  (diff {:.3e})", (orig - q).abs());
        }

        let mut again = quantized;
        quantize_in_place(&mut again, self.format)?;
        ensure!(again == quantized, "second {} pass changed the values", self.format);
        Ok(())
    }

    fn check_random_tensor(&self) -> Result<()> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let data: Vec<f32> = (0..self.samples).map(|_| rng.random_range(-1.0f32..1.0)).collect();
        let mut tensor = HostTensor::new("random", data);

        let request = QuantizationRequest::new(self.format).with_compare_mode(true);
        let report = apply_with_report(&mut tensor, &request)?;
        let stats = report.stats.context("no elements were quantized")?;

        println!("Random tensor (seed {}):", self.seed);
        println!("  {stats}");
        println!("  range {:?} -> {:?}", stats.original_range, stats.quantized_range);
        ensure!(
            stats.changed > 0,
            "no element changed by more than {CHANGE_THRESHOLD:e} under {}",
            self.format
        );
        println!("OK");
        Ok(())
    }
}

fn describe(convention: &dyn NamingConvention, name: &str) -> String {
    match convention.parse(name) {
        Some(parsed) => format!("layer {} / {}", parsed.block_index, parsed.component),
        None => "-".to_string(),
    }
}

fn check_naming() {
    let block = PolicyStore::new();
    let graph = PolicyStore::new().with_convention(Arc::new(GraphNodeConvention));
    for store in [&block, &graph] {
        store.set(true, ElementFormat::TruncatedHalf16, None);
    }

    println!("Tensor names:");
    println!(
        "  {:<20} {:<22} {:<22} {}",
        "name", "blk.N.COMPONENT", "COMPONENT-N", "ffn_norm policy"
    );
    for name in SAMPLE_NAMES {
        println!(
            "  {:<20} {:<22} {:<22} {}",
            name,
            describe(&BlockConvention, name),
            describe(&GraphNodeConvention, name),
            if block.applies_to(name) || graph.applies_to(name) { "applies" } else { "-" },
        );
    }
}

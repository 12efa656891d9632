//! `fakequant`: measure the effect of 16-bit storage on f32 tensors.
//!
//! ```bash
//! # Self-check the codecs and tensor-name parsing
//! fakequant verify
//!
//! # Fake-quantize a raw little-endian f32 dump
//! fakequant buffer --input norm.bin --output norm.bf16.bin --format bf16
//!
//! # Fake-quantize the ffn_norm weights of layers 0 and 1 in a model
//! fakequant gguf --input model.gguf --output model.fq.gguf --layers 0,1
//!
//! # List the tensors of a model
//! fakequant inspect --input model.gguf --filter ffn_norm
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use commands::{BufferCommand, GgufCommand, InspectCommand, VerifyCommand};

#[derive(Parser, Debug)]
#[command(name = "fakequant")]
#[command(about = "Fake-quantize f32 tensors through bf16/f16 round-trips")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[arg(long, value_name = "LEVEL", global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Self-check codecs, naming conventions and a seeded random tensor
    Verify(VerifyCommand),
    /// Fake-quantize a raw little-endian f32 file
    Buffer(BufferCommand),
    /// Fake-quantize selected f32 tensors of a GGUF model
    Gguf(GgufCommand),
    /// List the tensors of a GGUF model
    Inspect(InspectCommand),
}

fn setup_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let result: Result<()> = match &cli.command {
        Commands::Verify(cmd) => cmd.execute(),
        Commands::Buffer(cmd) => cmd.execute(),
        Commands::Gguf(cmd) => cmd.execute(),
        Commands::Inspect(cmd) => cmd.execute(),
    };

    if let Err(e) = result {
        error!("Command failed: {e}");
        for cause in e.chain().skip(1) {
            error!("  Caused by: {cause}");
        }
        std::process::exit(1);
    }
}

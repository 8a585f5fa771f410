#![doc = include_str!("../README.md")]

mod cli;

use clap::Parser;
use cli::{CliArgs, CliConfig, init_telemetry};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    init_telemetry()?;

    if cfg!(debug_assertions) {
        tracing::debug!("Starting with full config: {config:#?}");
    }

    cli::run(config).await
}

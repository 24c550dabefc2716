//! leadscout CLI: discover, enrich, and rank business leads.
//!
//! Fans an (industry, location) query out across the configured sources
//! and writes the ranked batch to the lead archive.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

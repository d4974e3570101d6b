//! asinscout CLI: related-product discovery for Amazon marketplaces.
//!
//! Finds products related to a seed ASIN, enriches them with listing
//! metadata, and ranks them against niche criteria.

mod commands;
mod export;

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

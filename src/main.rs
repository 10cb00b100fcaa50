//! snapvault - encrypted, versioned directory snapshots
//!
//! Main binary entry point for the command-line interface.

use anyhow::Context;
use clap::Parser;
use snapvault::cli::Cli;
use snapvault::logging::{default_level, init_logging};
use snapvault::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_to(&mut config);

    init_logging(
        default_level(&config.logging.level, cli.quiet, cli.verbose),
        config.logging.format,
    );

    snapvault::cli::run(cli, config).await?;
    Ok(())
}

//! ballotd: entry point for the ballot pipeline services.

mod cli;
mod services;

use anyhow::Context;
use ballot_utils::{init_logging, LogFormat, ShutdownController};
use clap::Parser;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Validate(ref args) => {
            let config = cli::validator_config(cli.config.as_deref(), &cli.logging, args)?;
            start_logging(&config.log_format, &config.log_level)?;
            let shutdown = install_signal_handler();
            services::run_validator(config, shutdown).await
        }
        Command::Aggregate(ref args) => {
            let config = cli::aggregator_config(cli.config.as_deref(), &cli.logging, args)?;
            start_logging(&config.log_format, &config.log_level)?;
            let shutdown = install_signal_handler();
            services::run_aggregator(config, shutdown).await
        }
        Command::RebuildTallies(ref args) => {
            let config = cli::rebuild_config(cli.config.as_deref(), &cli.logging, args)?;
            start_logging(&config.log_format, &config.log_level)?;
            services::rebuild_tallies(&config).await
        }
    }
}

fn start_logging(format: &str, level: &str) -> anyhow::Result<()> {
    let format: LogFormat = format
        .parse()
        .map_err(anyhow::Error::msg)
        .context("invalid log format")?;
    init_logging(format, level);
    Ok(())
}

fn install_signal_handler() -> ShutdownController {
    let shutdown = ShutdownController::new();
    let listener = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = listener.wait_for_signal().await {
            tracing::error!(error = %e, "signal handler failed, shutting down");
            listener.shutdown();
        }
    });
    shutdown
}

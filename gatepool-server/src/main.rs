//! Gatepool Server - Headless Daemon
//!
//! Runs the account health monitor next to the gateway's account store:
//! - `serve` watches the pool until Ctrl-C
//! - `probe` runs one probe pass and prints it, without writing
//! - `config` prints the effective configuration

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod bootstrap;
mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = gatepool_core::modules::config::load_config(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                run_mode = %config.run_mode,
                "Gatepool server starting"
            );
            commands::handle_serve(&config).await
        },
        Commands::Probe { account_ids, json } => {
            commands::handle_probe(&config, account_ids, json).await
        },
        Commands::Config => commands::handle_config(&config),
    }
}

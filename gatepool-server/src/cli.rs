use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gatepool",
    about = "Gatepool Server - Account health monitor for the gateway pool",
    version = env!("CARGO_PKG_VERSION"),
    author,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, global = true, env = "GATEPOOL_CONFIG", help = "Path to config.json")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Run the account monitor until Ctrl-C (default if no command specified)")]
    Serve,

    #[command(about = "Probe monitored accounts once and print the results")]
    Probe {
        #[arg(long = "account-id", help = "Probe only this account (repeatable)")]
        account_ids: Vec<i64>,

        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },

    #[command(about = "Show the effective configuration with secrets redacted")]
    Config,
}

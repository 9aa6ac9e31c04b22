//! CLI definitions for Cadence.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cadence CLI.
#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Cron and interval job scheduler with misfire recovery")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/cadence.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler in foreground (default)
    Run,

    /// Validate the configuration and print the jobs it declares
    Check {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },
}

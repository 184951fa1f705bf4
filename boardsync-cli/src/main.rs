//! Boardsync — keep store-managed dashboards in sync with a file tree.
//!
//! # Usage
//!
//! ```text
//! boardsync pull [--config <path>]
//! boardsync push --all [--config <path>]
//! boardsync push --since <rev> [--delete-removed] [--config <path>]
//! boardsync status [--json] [--config <path>]
//! boardsync daemon start|stop|status [--config <path>]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use boardsync_core::Config;
use commands::{daemon::DaemonCommand, push::PushArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "boardsync",
    version,
    about = "Reconcile dashboards, folders and library elements with a versioned file tree",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Snapshot the store into canonical files and commit the result.
    Pull,

    /// Apply file changes back to the store, then pull.
    Push(PushArgs),

    /// Show the baseline: every tracked entity and its synced version.
    Status(StatusArgs),

    /// Manage the background reconciliation daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn load_config(path: &PathBuf) -> Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config from {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Pull => commands::pull::run(&load_config(&cli.config)?),
        Commands::Push(args) => args.run(&load_config(&cli.config)?),
        Commands::Status(args) => args.run(&load_config(&cli.config)?),
        Commands::Daemon { command } => commands::daemon::run(command, &cli.config),
    }
}

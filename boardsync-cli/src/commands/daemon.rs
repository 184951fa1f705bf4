//! `boardsync daemon` — background reconciliation lifecycle.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;

use boardsync_core::Config;
use boardsync_daemon::paths::socket_path;
use boardsync_daemon::{
    request_pull, request_push, request_status, request_stop, start_blocking, DaemonError,
    ReconcileSummary,
};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (poller + socket server).
    Start,
    /// Request graceful daemon shutdown over the unix socket.
    Stop,
    /// Query daemon runtime status over the unix socket.
    Status,
    /// Ask the running daemon to pull from the store now.
    Pull,
    /// Ask the running daemon to push every canonical file now.
    Push,
}

pub fn run(command: DaemonCommand, config_path: &Path) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        DaemonCommand::Start => {
            let config = Config::load(config_path).with_context(|| {
                format!("failed to load config from {}", config_path.display())
            })?;
            start_blocking(config, &home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(info) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&info)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Pull => print_reconcile(request_pull(&home), "pull")?,
        DaemonCommand::Push => print_reconcile(request_push(&home), "push")?,
    }

    Ok(())
}

fn print_reconcile(
    result: Result<ReconcileSummary, DaemonError>,
    what: &str,
) -> Result<()> {
    match result {
        Ok(summary) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .context("failed to render reconcile summary JSON")?
            );
            Ok(())
        }
        Err(DaemonError::DaemonNotRunning { .. }) => {
            println!("daemon is not running; use `boardsync {what}` to reconcile directly");
            Ok(())
        }
        Err(err) => Err(err).with_context(|| format!("daemon {what} failed")),
    }
}

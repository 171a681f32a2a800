//! `gameroom daemon`: foreground orchestrator lifecycle.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use gameroom_core::config;
use gameroom_daemon::paths::socket_path;
use gameroom_daemon::{request_status, request_stop, start_blocking, DaemonError, ShutdownReport};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the orchestrator in the foreground (control socket + room workers).
    Start(DaemonStartArgs),
    /// Stop all room workers and shut the daemon down.
    Stop,
    /// Query daemon runtime status over the control socket.
    Status,
}

#[derive(Args, Debug)]
pub struct DaemonStartArgs {
    /// Read configuration from this file instead of ~/.gameroom/config.yaml.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        DaemonCommand::Start(args) => {
            let settings = match args.config.as_deref() {
                Some(path) => config::load_from(path),
                None => config::load_at(&home),
            }
            .context("failed to load orchestrator config")?;
            settings
                .validate()
                .context("invalid orchestrator config")?;

            let report = start_blocking(&home, settings).context("daemon exited with error")?;
            print_report(&report);
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(_) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
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
    }

    Ok(())
}

fn print_report(report: &ShutdownReport) {
    println!(
        "stopped {} worker(s), cleared {} room(s), released {} port(s)",
        report.stopped.len(),
        report.rooms_cleared,
        report.ports_released,
    );
    for failure in &report.failed {
        println!(
            "{} {} {}",
            "failed to stop".red(),
            failure.handle,
            failure.reason.bright_black()
        );
    }
    if let Some(error) = &report.listing_error {
        println!("{} {error}", "could not list workers:".yellow());
    }
}

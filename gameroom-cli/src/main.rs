//! gameroom — provision isolated game room workers.
//!
//! # Usage
//!
//! ```text
//! gameroom daemon start [--config <path>]
//! gameroom daemon stop|status
//! gameroom room create [--json]
//! gameroom room list [--json]
//! gameroom room get <room-id> [--json]
//! gameroom room delete <room-id>
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{daemon::DaemonCommand, room::RoomCommand};

#[derive(Parser, Debug)]
#[command(
    name = "gameroom",
    version,
    about = "Create and tear down game rooms, one worker process per room",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, inspect and delete rooms through the running daemon.
    Room {
        #[command(subcommand)]
        command: RoomCommand,
    },

    /// Run or control the room orchestrator daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Room { command } => commands::room::run(command),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}

//! `gameroom room`: client side of the room lifecycle.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use gameroom_core::RoomSummary;
use gameroom_daemon::{
    request_create, request_delete, request_get, request_list, DaemonError,
};

#[derive(Subcommand, Debug)]
pub enum RoomCommand {
    /// Reserve a port and start a worker for a new room.
    Create(OutputArgs),
    /// Show every active room.
    List(OutputArgs),
    /// Show one room.
    Get {
        room_id: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Stop a room's worker and free its port.
    Delete { room_id: String },
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct RoomRow {
    #[tabled(rename = "room")]
    room_id: String,
    #[tabled(rename = "port")]
    port: u16,
    #[tabled(rename = "endpoint")]
    endpoint: String,
    #[tabled(rename = "uptime")]
    uptime: String,
    #[tabled(rename = "created")]
    created: String,
}

impl From<&RoomSummary> for RoomRow {
    fn from(room: &RoomSummary) -> Self {
        Self {
            room_id: room.room_id.to_string(),
            port: room.port,
            endpoint: room.endpoint.clone(),
            uptime: format_uptime(room.uptime_ms),
            created: format_created(room.created_at),
        }
    }
}

pub fn run(command: RoomCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        RoomCommand::Create(output) => {
            let room = request_create(&home).map_err(|err| daemon_error(err, "create room"))?;
            if output.json {
                return print_json(&room);
            }
            println!(
                "{} room {} at {}",
                "created".green().bold(),
                room.room_id.to_string().bold(),
                room.endpoint
            );
        }
        RoomCommand::List(output) => {
            let rooms = request_list(&home).map_err(|err| daemon_error(err, "list rooms"))?;
            if output.json {
                return print_json(&rooms);
            }
            print_table(&rooms);
        }
        RoomCommand::Get { room_id, output } => {
            let room =
                request_get(&home, &room_id).map_err(|err| daemon_error(err, "get room"))?;
            if output.json {
                return print_json(&room);
            }
            print_table(std::slice::from_ref(&room));
        }
        RoomCommand::Delete { room_id } => {
            let result =
                request_delete(&home, &room_id).map_err(|err| daemon_error(err, "delete room"))?;
            let outcome = result["stop"]["outcome"].as_str().unwrap_or("unknown");
            if outcome == "failed" {
                let reason = result["stop"]["reason"].as_str().unwrap_or_default();
                println!(
                    "{} room {room_id}; worker did not stop: {}",
                    "deleted".yellow().bold(),
                    reason.bright_black()
                );
            } else {
                println!("{} room {room_id} ({outcome})", "deleted".green().bold());
            }
        }
    }

    Ok(())
}

fn daemon_error(err: DaemonError, action: &str) -> anyhow::Error {
    match err {
        DaemonError::DaemonNotRunning { .. } => {
            anyhow!("daemon is not running; start it with `gameroom daemon start`")
        }
        DaemonError::Remote { message, .. } => anyhow!("failed to {action}: {message}"),
        other => anyhow::Error::new(other).context(format!("failed to {action}")),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize room JSON")?
    );
    Ok(())
}

fn print_table(rooms: &[RoomSummary]) {
    if rooms.is_empty() {
        println!("No active rooms.");
        return;
    }
    let rows: Vec<RoomRow> = rooms.iter().map(RoomRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("{} room(s)", rooms.len());
}

fn format_uptime(uptime_ms: u64) -> String {
    let seconds = uptime_ms / 1000;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

fn format_created(created_at: DateTime<Utc>) -> String {
    created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

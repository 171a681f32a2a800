//! Domain types for the room orchestrator.
//!
//! Rooms are immutable once created; the orchestrator replaces entries
//! rather than patching them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A TCP port number inside the configured range.
pub type Port = u16;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Short random identifier of a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomId(pub String);

impl RoomId {
    /// Number of hex characters kept from a v4 UUID.
    pub const LEN: usize = 8;

    /// Fresh id: the first eight characters of a v4 UUID.
    pub fn generate() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(Self::LEN);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RoomId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RoomId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Runtime reference to a worker process (a container id for docker).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessHandle(pub String);

impl ProcessHandle {
    /// Abbreviated form used in log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProcessHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProcessHandle {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One active room: a worker process listening on a reserved port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub port: Port,
    pub handle: ProcessHandle,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Milliseconds since creation, clamped at zero.
    pub fn uptime_ms(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.created_at).num_milliseconds()).unwrap_or(0)
    }

    /// Client-facing view of the room.
    pub fn summary(&self, public_host: &str, now: DateTime<Utc>) -> RoomSummary {
        RoomSummary {
            room_id: self.id.clone(),
            port: self.port,
            endpoint: format!("ws://{public_host}:{}", self.port),
            created_at: self.created_at,
            uptime_ms: self.uptime_ms(now),
        }
    }
}

/// What the control plane returns for create/get/list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub port: Port,
    pub endpoint: String,
    pub created_at: DateTime<Utc>,
    pub uptime_ms: u64,
}

/// Outcome of one external-tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// One row of the runtime's process listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub id: String,
    pub name: String,
    pub ports: String,
    pub status: String,
}

impl ProcessInfo {
    /// Parse an `id|name|ports|status` line. Blank lines yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let mut fields = line.split('|').map(|f| f.trim().to_string());
        Some(Self {
            id: fields.next().unwrap_or_default(),
            name: fields.next().unwrap_or_default(),
            ports: fields.next().unwrap_or_default(),
            status: fields.next().unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Best-effort outcomes
// ---------------------------------------------------------------------------

/// Result of stopping a worker. Never an error: stop runs on cleanup paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum StopOutcome {
    /// Graceful stop reported success.
    Graceful,
    /// Graceful stop failed; kill reported success.
    Forced,
    /// Neither stop nor kill succeeded. Logged and ignored.
    Failed { reason: String },
}

impl StopOutcome {
    pub fn is_stopped(&self) -> bool {
        !matches!(self, StopOutcome::Failed { .. })
    }
}

/// Process listing plus the reason it is empty when the listing itself failed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Listing {
    pub processes: Vec<ProcessInfo>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

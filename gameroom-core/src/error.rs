//! Error types for gameroom-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{Port, RoomId};

/// Failures surfaced by room lifecycle operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Every port in the configured range is reserved.
    #[error("no available ports ({base}-{max})")]
    NoPortsAvailable { base: Port, max: Port },

    /// The worker did not report success or did not pass the liveness check.
    #[error("failed to launch worker for room {room_id}: {reason}")]
    LaunchFailed { room_id: RoomId, reason: String },

    /// Lookup on an id that is not in the registry.
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),

    /// A shutdown sweep has started; no new rooms are provisioned.
    #[error("orchestrator is shutting down")]
    ShuttingDown,

    /// The process-control tool itself could not be run.
    #[error("external tool `{tool}` could not run: {source}")]
    ExternalToolError {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The bind check failed for a reason other than "address in use".
    #[error("port {port} probe failed: {source}")]
    PortProbe {
        port: Port,
        #[source]
        source: std::io::Error,
    },
}

impl OrchestratorError {
    /// Stable machine-readable code for the control-plane adapter.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::NoPortsAvailable { .. } => "no_ports_available",
            OrchestratorError::LaunchFailed { .. } => "launch_failed",
            OrchestratorError::RoomNotFound(_) => "room_not_found",
            OrchestratorError::ShuttingDown => "shutting_down",
            OrchestratorError::ExternalToolError { .. } => "external_tool_error",
            OrchestratorError::PortProbe { .. } => "port_probe_failed",
        }
    }

    /// `true` for failures worth logging as errors: neither a bad id from
    /// the caller nor a refusal during shutdown.
    pub fn is_server_fault(&self) -> bool {
        !matches!(
            self,
            OrchestratorError::RoomNotFound(_) | OrchestratorError::ShuttingDown
        )
    }
}

/// Errors loading or saving `~/.gameroom/config.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// Config loaded but describes an unusable setup.
    #[error("invalid config: {0}")]
    Invalid(String),
}

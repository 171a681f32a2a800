//! Game room core library — domain types, configuration, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes and room records
//! - [`error`] — [`OrchestratorError`] and [`ConfigError`]
//! - [`config`] — load / save / validate

pub mod config;
pub mod error;
pub mod types;

pub use config::{OrchestratorConfig, PortRange};
pub use error::{ConfigError, OrchestratorError};
pub use types::{
    CommandResult, Listing, Port, ProcessHandle, ProcessInfo, Room, RoomId, RoomSummary,
    StopOutcome,
};

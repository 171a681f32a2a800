use std::process::Command;
use std::thread::sleep;
use std::time::Duration;

use gameroom_core::{
    CommandResult, Listing, OrchestratorConfig, OrchestratorError, Port, ProcessHandle,
    ProcessInfo, RoomId, StopOutcome,
};

/// Synchronous access to the tool that runs worker processes.
pub trait ProcessRuntime: Send + Sync {
    /// Run the tool with `args`. `Err` only when the tool itself could not run.
    fn run(&self, args: &[String]) -> Result<CommandResult, OrchestratorError>;
}

/// Shells out to a docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    binary: String,
}

impl DockerRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl ProcessRuntime for DockerRuntime {
    fn run(&self, args: &[String]) -> Result<CommandResult, OrchestratorError> {
        tracing::debug!(tool = %self.binary, args = ?args, "running runtime command");
        let output = Command::new(&self.binary)
            .args(args.iter().map(String::as_str))
            .output()
            .map_err(|source| OrchestratorError::ExternalToolError {
                tool: self.binary.clone(),
                source,
            })?;

        Ok(CommandResult {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// How long to wait before and between liveness checks after a start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicy {
    pub settle: Duration,
    pub attempts: u32,
    pub interval: Duration,
}

impl VerifyPolicy {
    pub fn immediate() -> Self {
        Self {
            settle: Duration::ZERO,
            attempts: 1,
            interval: Duration::ZERO,
        }
    }
}

/// Starts, stops and lists room workers through a [`ProcessRuntime`].
pub struct Launcher {
    runtime: Box<dyn ProcessRuntime>,
    image: String,
    name_prefix: String,
    verify: VerifyPolicy,
}

impl Launcher {
    pub fn new(
        runtime: Box<dyn ProcessRuntime>,
        image: impl Into<String>,
        name_prefix: impl Into<String>,
        verify: VerifyPolicy,
    ) -> Self {
        Self {
            runtime,
            image: image.into(),
            name_prefix: name_prefix.into(),
            verify,
        }
    }

    pub fn from_config(runtime: Box<dyn ProcessRuntime>, config: &OrchestratorConfig) -> Self {
        Self::new(
            runtime,
            config.image.clone(),
            config.name_prefix.clone(),
            VerifyPolicy {
                settle: config.settle(),
                attempts: config.verify_attempts.max(1),
                interval: config.verify_interval(),
            },
        )
    }

    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    /// `game-room-<id>` for the default prefix.
    pub fn process_name(&self, room_id: &RoomId) -> String {
        format!("{}{}", self.name_prefix, room_id)
    }

    /// Launch the worker for `room_id` on `port`, then settle and verify it.
    ///
    /// The caller owns the port reservation and must release it on `Err`.
    pub fn start(&self, room_id: &RoomId, port: Port) -> Result<ProcessHandle, OrchestratorError> {
        let name = self.process_name(room_id);
        tracing::info!(room_id = %room_id, port, name = %name, "launching room worker");

        let result = self.runtime.run(&self.start_args(&name, room_id, port))?;
        if !result.success {
            return Err(OrchestratorError::LaunchFailed {
                room_id: room_id.clone(),
                reason: format!("start command failed: {}", result.stderr.trim()),
            });
        }

        let handle = ProcessHandle::from(result.stdout.trim().to_string());
        if handle.0.is_empty() {
            return Err(OrchestratorError::LaunchFailed {
                room_id: room_id.clone(),
                reason: "start command returned no process id".to_string(),
            });
        }

        sleep(self.verify.settle);
        let attempts = self.verify.attempts.max(1);
        for attempt in 1..=attempts {
            let alive = match self.is_alive(&handle) {
                Ok(alive) => alive,
                Err(err) => {
                    let outcome = self.stop(&handle);
                    tracing::warn!(
                        room_id = %room_id,
                        handle = %handle.short(),
                        outcome = ?outcome,
                        error = %err,
                        "liveness check could not run",
                    );
                    return Err(err);
                }
            };
            if alive {
                tracing::info!(
                    room_id = %room_id,
                    handle = %handle.short(),
                    attempt,
                    "room worker started",
                );
                return Ok(handle);
            }
            if attempt < attempts {
                sleep(self.verify.interval);
            }
        }

        // Best effort: a worker that never became visible may still be starting.
        let outcome = self.stop(&handle);
        tracing::warn!(
            room_id = %room_id,
            handle = %handle.short(),
            outcome = ?outcome,
            "room worker failed liveness check",
        );
        Err(OrchestratorError::LaunchFailed {
            room_id: room_id.clone(),
            reason: format!("worker {} failed to start", handle.short()),
        })
    }

    /// Graceful stop, escalating to kill. Never fails the caller.
    pub fn stop(&self, handle: &ProcessHandle) -> StopOutcome {
        tracing::info!(handle = %handle.short(), "stopping room worker");

        let graceful = self.run_logged(&["stop".to_string(), handle.0.clone()]);
        if graceful.success {
            return StopOutcome::Graceful;
        }

        let forced = self.run_logged(&["kill".to_string(), handle.0.clone()]);
        if forced.success {
            tracing::warn!(handle = %handle.short(), "graceful stop failed; worker killed");
            return StopOutcome::Forced;
        }

        let reason = format!(
            "stop: {}; kill: {}",
            graceful.stderr.trim(),
            forced.stderr.trim()
        );
        tracing::error!(handle = %handle.short(), reason = %reason, "failed to stop room worker");
        StopOutcome::Failed { reason }
    }

    /// Workers whose name starts with `prefix`. Empty (with `error`) if listing fails.
    pub fn list(&self, prefix: &str) -> Listing {
        let args = vec![
            "ps".to_string(),
            "--filter".to_string(),
            format!("name={prefix}"),
            "--format".to_string(),
            "{{.ID}}|{{.Names}}|{{.Ports}}|{{.Status}}".to_string(),
        ];

        let error = match self.runtime.run(&args) {
            Ok(result) if result.success => {
                let processes = result
                    .stdout
                    .lines()
                    .filter_map(ProcessInfo::parse_line)
                    .filter(|info| info.name.starts_with(prefix))
                    .collect();
                return Listing {
                    processes,
                    error: None,
                };
            }
            Ok(result) => format!("list command failed: {}", result.stderr.trim()),
            Err(err) => err.to_string(),
        };

        tracing::warn!(prefix, error = %error, "could not list room workers");
        Listing {
            processes: Vec::new(),
            error: Some(error),
        }
    }

    fn start_args(&self, name: &str, room_id: &RoomId, port: Port) -> Vec<String> {
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
            "-p".to_string(),
            format!("{port}:{port}"),
            "-e".to_string(),
            format!("PORT={port}"),
            "-e".to_string(),
            format!("ROOM_ID={room_id}"),
            self.image.clone(),
        ]
    }

    fn is_alive(&self, handle: &ProcessHandle) -> Result<bool, OrchestratorError> {
        let result = self.runtime.run(&[
            "ps".to_string(),
            "-q".to_string(),
            "-f".to_string(),
            format!("id={}", handle.0),
        ])?;
        Ok(result.success && !result.stdout.trim().is_empty())
    }

    fn run_logged(&self, args: &[String]) -> CommandResult {
        match self.runtime.run(args) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "runtime command could not run");
                CommandResult::failed(err.to_string())
            }
        }
    }
}

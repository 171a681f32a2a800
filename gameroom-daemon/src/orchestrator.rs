//! Room lifecycle: Provisioning → Active → Terminating → Gone.
//!
//! The orchestrator is the only writer of the room registry and the port
//! reservations. Both live behind one mutex; slow runtime calls (start with
//! its settle wait, stop, list) run with the lock released.
//!
//! `shutdown_all` closes the orchestrator for good: later creates fail with
//! `ShuttingDown`, and the sweep waits for creates already in flight.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;

use gameroom_core::{
    OrchestratorConfig, OrchestratorError, Port, ProcessHandle, Room, RoomId, RoomSummary,
    StopOutcome,
};

use crate::launcher::{DockerRuntime, Launcher, ProcessRuntime};
use crate::ports::{PortAllocator, PortProbe, TcpProbe};
use crate::registry::RoomRegistry;

/// Produces ids for new rooms.
pub type IdSource = Box<dyn Fn() -> RoomId + Send + Sync>;

const MAX_ID_ATTEMPTS: usize = 8;

struct State {
    ports: PortAllocator,
    rooms: RoomRegistry,
    terminating: HashSet<RoomId>,
    closing: bool,
    /// Creates holding a reservation whose worker is not registered yet.
    provisioning: usize,
}

/// Counts reported by the daemon's `status` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestratorStatus {
    pub rooms: usize,
    pub reserved_ports: Vec<Port>,
    pub closing: bool,
}

/// What a shutdown sweep did. Failures here are logged, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub stopped: Vec<String>,
    pub failed: Vec<StopFailure>,
    pub rooms_cleared: usize,
    pub ports_released: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopFailure {
    pub handle: String,
    pub reason: String,
}

pub struct Orchestrator {
    state: Mutex<State>,
    provisioned: Condvar,
    launcher: Launcher,
    ids: IdSource,
    public_host: String,
}

impl Orchestrator {
    pub fn new(
        config: &OrchestratorConfig,
        probe: Box<dyn PortProbe>,
        runtime: Box<dyn ProcessRuntime>,
    ) -> Self {
        Self {
            state: Mutex::new(State {
                ports: PortAllocator::new(config.port_range, probe),
                rooms: RoomRegistry::new(),
                terminating: HashSet::new(),
                closing: false,
                provisioning: 0,
            }),
            provisioned: Condvar::new(),
            launcher: Launcher::from_config(runtime, config),
            ids: Box::new(RoomId::generate),
            public_host: config.public_host.clone(),
        }
    }

    /// Real bind checks on `bind_host` and the configured runtime binary.
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(
            config,
            Box::new(TcpProbe::new(config.bind_host)),
            Box::new(DockerRuntime::new(config.runtime.clone())),
        )
    }

    pub fn with_id_source(mut self, ids: IdSource) -> Self {
        self.ids = ids;
        self
    }

    /// Reserve a port, launch a worker on it and register the room.
    pub fn create_room(&self) -> Result<RoomSummary, OrchestratorError> {
        let (id, port) = {
            let mut state = self.lock();
            if state.closing {
                return Err(OrchestratorError::ShuttingDown);
            }
            let id = self.fresh_id(&state);
            let port = state.ports.acquire()?;
            state.provisioning += 1;
            (id, port)
        };
        let _in_flight = InFlight(self);
        tracing::info!(room_id = %id, port, "creating room");
        self.provision(id, port)
    }

    /// Start and register the worker for a reserved port. Every failure path
    /// gives the port back.
    fn provision(&self, id: RoomId, port: Port) -> Result<RoomSummary, OrchestratorError> {
        let handle = match self.launcher.start(&id, port) {
            Ok(handle) => handle,
            Err(err) => {
                self.lock().ports.release(port);
                tracing::error!(room_id = %id, port, error = %err, "failed to create room");
                return Err(err);
            }
        };

        let room = Room {
            id,
            port,
            handle,
            created_at: Utc::now(),
        };
        let summary = room.summary(&self.public_host, room.created_at);

        let mut state = self.lock();
        if state.closing {
            state.ports.release(port);
            drop(state);
            let outcome = self.launcher.stop(&room.handle);
            tracing::warn!(
                room_id = %room.id,
                handle = %room.handle.short(),
                outcome = ?outcome,
                "shutdown began during create; worker stopped",
            );
            return Err(OrchestratorError::ShuttingDown);
        }
        state.rooms.insert(room);
        drop(state);
        tracing::info!(room_id = %summary.room_id, port, endpoint = %summary.endpoint, "room active");
        Ok(summary)
    }

    pub fn get_room(&self, id: &RoomId) -> Result<RoomSummary, OrchestratorError> {
        let state = self.lock();
        state
            .rooms
            .get(id)
            .map(|room| room.summary(&self.public_host, Utc::now()))
            .ok_or_else(|| OrchestratorError::RoomNotFound(id.clone()))
    }

    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let now = Utc::now();
        self.lock()
            .rooms
            .list_all()
            .iter()
            .map(|room| room.summary(&self.public_host, now))
            .collect()
    }

    /// Stop the worker, then drop the registry entry and its port.
    ///
    /// The entry stays visible until the stop returns, so an interrupted
    /// delete can be retried. A delete racing another delete of the same id
    /// gets `RoomNotFound`. If a shutdown sweep cleared the entry while the
    /// stop ran, the stop outcome is still returned.
    pub fn delete_room(&self, id: &RoomId) -> Result<StopOutcome, OrchestratorError> {
        let handle = {
            let mut state = self.lock();
            let handle = match state.rooms.get(id) {
                Some(room) if !state.terminating.contains(id) => room.handle.clone(),
                _ => return Err(OrchestratorError::RoomNotFound(id.clone())),
            };
            state.terminating.insert(id.clone());
            handle
        };
        tracing::info!(room_id = %id, handle = %handle.short(), "deleting room");

        let outcome = self.launcher.stop(&handle);

        let mut state = self.lock();
        state.terminating.remove(id);
        match state.rooms.remove(id) {
            Some(room) => {
                state.ports.release(room.port);
                tracing::info!(room_id = %id, port = room.port, outcome = ?outcome, "room deleted");
            }
            None => {
                tracing::info!(room_id = %id, outcome = ?outcome, "room already cleared by shutdown");
            }
        }
        Ok(outcome)
    }

    /// Stop every worker the runtime knows by name prefix plus every registered
    /// one, concurrently, then clear the registry and all reservations.
    ///
    /// Closes the orchestrator first and waits for in-flight creates, which
    /// stop their own workers once they see the flag.
    pub fn shutdown_all(&self) -> ShutdownReport {
        let registered = {
            let mut state = self.lock();
            state.closing = true;
            while state.provisioning > 0 {
                state = self
                    .provisioned
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            state.rooms.list_all()
        };
        let listing = self.launcher.list(self.launcher.name_prefix());

        let mut targets: Vec<ProcessHandle> = listing
            .processes
            .iter()
            .filter(|info| !info.id.is_empty())
            .map(|info| ProcessHandle::from(info.id.clone()))
            .collect();
        for room in &registered {
            if !targets.iter().any(|known| same_process(known, &room.handle)) {
                targets.push(room.handle.clone());
            }
        }
        tracing::info!(
            processes = targets.len(),
            rooms = registered.len(),
            "shutting down room workers",
        );

        let outcomes: Vec<(ProcessHandle, StopOutcome)> = std::thread::scope(|scope| {
            let workers: Vec<_> = targets
                .iter()
                .map(|handle| (handle, scope.spawn(move || self.launcher.stop(handle))))
                .collect();
            workers
                .into_iter()
                .map(|(handle, worker)| {
                    let outcome = worker.join().unwrap_or_else(|_| StopOutcome::Failed {
                        reason: "stop worker panicked".to_string(),
                    });
                    (handle.clone(), outcome)
                })
                .collect()
        });

        let mut report = ShutdownReport {
            listing_error: listing.error,
            ..ShutdownReport::default()
        };
        for (handle, outcome) in outcomes {
            match outcome {
                StopOutcome::Failed { reason } => {
                    tracing::warn!(handle = %handle.short(), reason = %reason, "worker not stopped during shutdown");
                    report.failed.push(StopFailure {
                        handle: handle.0,
                        reason,
                    });
                }
                StopOutcome::Graceful | StopOutcome::Forced => report.stopped.push(handle.0),
            }
        }

        let mut state = self.lock();
        report.rooms_cleared = state.rooms.drain().len();
        report.ports_released = state.ports.reserved().len();
        state.ports.clear();
        state.terminating.clear();
        drop(state);

        tracing::info!(
            stopped = report.stopped.len(),
            failed = report.failed.len(),
            rooms_cleared = report.rooms_cleared,
            "cleaned up room workers",
        );
        report
    }

    pub fn status(&self) -> OrchestratorStatus {
        let state = self.lock();
        OrchestratorStatus {
            rooms: state.rooms.len(),
            reserved_ports: state.ports.reserved(),
            closing: state.closing,
        }
    }

    fn fresh_id(&self, state: &State) -> RoomId {
        let mut id = (self.ids)();
        for _ in 1..MAX_ID_ATTEMPTS {
            if state.rooms.get(&id).is_none() {
                break;
            }
            id = (self.ids)();
        }
        id
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counts one create in `State::provisioning` until dropped.
struct InFlight<'a>(&'a Orchestrator);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.provisioning -= 1;
        if state.provisioning == 0 {
            self.0.provisioned.notify_all();
        }
    }
}

/// Listing ids are abbreviated; registry handles are the full id.
fn same_process(a: &ProcessHandle, b: &ProcessHandle) -> bool {
    a.0.starts_with(&b.0) || b.0.starts_with(&a.0)
}

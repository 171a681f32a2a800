#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gameroom_core::{CommandResult, OrchestratorConfig, OrchestratorError, Port, PortRange};
use gameroom_daemon::{Orchestrator, PortProbe, ProcessRuntime};

/// Ports in `busy` fail the bind check with `AddrInUse`.
#[derive(Clone, Default)]
pub struct FakeProbe {
    pub busy: Arc<Mutex<HashSet<Port>>>,
}

impl FakeProbe {
    pub fn with_busy(ports: &[Port]) -> Self {
        let probe = Self::default();
        probe.busy.lock().unwrap().extend(ports.iter().copied());
        probe
    }
}

impl PortProbe for FakeProbe {
    fn probe(&self, port: Port) -> io::Result<()> {
        if self.busy.lock().unwrap().contains(&port) {
            return Err(io::Error::new(io::ErrorKind::AddrInUse, "port in use"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RuntimeState {
    next_id: u64,
    /// Live workers: full id -> name.
    pub workers: BTreeMap<String, String>,
    /// Names whose worker starts but never shows up in `ps`.
    pub invisible: HashSet<String>,
    /// Full ids that ignore both stop and kill.
    pub stubborn: HashSet<String>,
    pub fail_runs: bool,
    pub fail_listing: bool,
    pub stops: Vec<String>,
}

const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Test side of a paused runtime call.
pub struct Gate {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl Gate {
    /// Block until the gated call is parked inside the runtime.
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(GATE_TIMEOUT)
            .expect("gated runtime call never arrived");
    }

    /// Let the parked call finish.
    pub fn open(&self) {
        let _ = self.release.send(());
    }
}

struct PendingGate {
    verb: String,
    entered: Sender<()>,
    release: Receiver<()>,
}

/// Behaves like a docker CLI backed by an in-memory process table.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    pub state: Arc<Mutex<RuntimeState>>,
    gate: Arc<Mutex<Option<PendingGate>>>,
}

impl FakeRuntime {
    /// Park the next `verb` call (e.g. `run`, `stop`) until the returned gate
    /// is opened. Later calls pass straight through.
    pub fn gate_next(&self, verb: &str) -> Gate {
        let (entered_tx, entered_rx) = channel();
        let (release_tx, release_rx) = channel();
        *self.gate.lock().unwrap() = Some(PendingGate {
            verb: verb.to_string(),
            entered: entered_tx,
            release: release_rx,
        });
        Gate {
            entered: entered_rx,
            release: release_tx,
        }
    }

    fn pass_gate(&self, args: &[String]) {
        let pending = {
            let mut slot = self.gate.lock().unwrap();
            let matches = slot
                .as_ref()
                .is_some_and(|gate| args.first() == Some(&gate.verb));
            if matches {
                slot.take()
            } else {
                None
            }
        };
        if let Some(gate) = pending {
            let _ = gate.entered.send(());
            let _ = gate.release.recv_timeout(GATE_TIMEOUT);
        }
    }

    /// A worker started outside this orchestrator, e.g. by a previous daemon.
    pub fn add_orphan(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = container_id(1000 + state.workers.len() as u64);
        state.workers.insert(id.clone(), name.to_string());
        id
    }

    pub fn live_names(&self) -> Vec<String> {
        self.state.lock().unwrap().workers.values().cloned().collect()
    }

    pub fn stops(&self) -> Vec<String> {
        self.state.lock().unwrap().stops.clone()
    }

    pub fn id_of(&self, name: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .workers
            .iter()
            .find(|(_, worker)| worker.as_str() == name)
            .map(|(id, _)| id.clone())
    }
}

impl ProcessRuntime for FakeRuntime {
    fn run(&self, args: &[String]) -> Result<CommandResult, OrchestratorError> {
        self.pass_gate(args);
        let mut state = self.state.lock().unwrap();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let result = match args.as_slice() {
            ["run", .., image] if !image.is_empty() => {
                if state.fail_runs {
                    return Ok(CommandResult::failed("Cannot connect to the Docker daemon"));
                }
                let name = args
                    .iter()
                    .position(|arg| *arg == "--name")
                    .and_then(|at| args.get(at + 1))
                    .map(|name| name.to_string())
                    .unwrap_or_default();
                state.next_id += 1;
                let id = container_id(state.next_id);
                if !state.invisible.contains(&name) {
                    state.workers.insert(id.clone(), name);
                }
                CommandResult::ok(format!("{id}\n"))
            }
            ["ps", "-q", "-f", filter] => {
                let id = filter.trim_start_matches("id=");
                if state.workers.contains_key(id) {
                    CommandResult::ok(format!("{}\n", &id[..12]))
                } else {
                    CommandResult::ok("")
                }
            }
            ["ps", "--filter", filter, "--format", _] => {
                if state.fail_listing {
                    return Err(OrchestratorError::ExternalToolError {
                        tool: "docker".to_string(),
                        source: io::Error::new(io::ErrorKind::NotFound, "docker not found"),
                    });
                }
                let prefix = filter.trim_start_matches("name=");
                let lines: Vec<String> = state
                    .workers
                    .iter()
                    .filter(|(_, name)| name.contains(prefix))
                    .map(|(id, name)| format!("{}|{name}|0.0.0.0:8000->8000/tcp|Up 3 minutes", &id[..12]))
                    .collect();
                CommandResult::ok(lines.join("\n"))
            }
            [verb @ ("stop" | "kill"), target] => {
                state.stops.push(format!("{verb} {target}"));
                let found = state
                    .workers
                    .keys()
                    .find(|id| id.starts_with(target))
                    .cloned();
                match found {
                    Some(id) if state.stubborn.contains(&id) => {
                        CommandResult::failed(format!("cannot {verb} container {target}"))
                    }
                    Some(id) => {
                        state.workers.remove(&id);
                        CommandResult::ok(format!("{target}\n"))
                    }
                    None => CommandResult::failed(format!("No such container: {target}")),
                }
            }
            other => CommandResult::failed(format!("unexpected command: {other:?}")),
        };
        Ok(result)
    }
}

/// 64 hex chars whose 12-char abbreviation is still unique.
fn container_id(n: u64) -> String {
    format!("{:016x}", n.wrapping_mul(0x9e37_79b9_7f4a_7c15)).repeat(4)
}

pub fn config(base: Port, max: Port) -> OrchestratorConfig {
    OrchestratorConfig {
        port_range: PortRange::new(base, max),
        settle_ms: 0,
        verify_interval_ms: 0,
        ..OrchestratorConfig::default()
    }
}

pub fn orchestrator(
    base: Port,
    max: Port,
    probe: &FakeProbe,
    runtime: &FakeRuntime,
) -> Orchestrator {
    Orchestrator::new(
        &config(base, max),
        Box::new(probe.clone()),
        Box::new(runtime.clone()),
    )
}

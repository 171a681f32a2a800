//! Room orchestrator daemon: port allocation, worker launch, registry,
//! lifecycle, and the control socket.

mod error;
pub mod launcher;
pub mod orchestrator;
pub mod paths;
pub mod ports;
pub mod protocol;
pub mod registry;
mod runtime;

pub use error::DaemonError;
pub use launcher::{DockerRuntime, Launcher, ProcessRuntime, VerifyPolicy};
pub use orchestrator::{IdSource, Orchestrator, OrchestratorStatus, ShutdownReport, StopFailure};
pub use ports::{PortAllocator, PortProbe, TcpProbe};
pub use protocol::{
    request_create, request_delete, request_get, request_list, request_status, request_stop,
    send_request, DaemonRequest, DaemonResponse,
};
pub use registry::RoomRegistry;
pub use runtime::{run, serve, start_blocking};

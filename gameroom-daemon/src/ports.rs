//! Port reservations backed by a live bind check.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, TcpListener};

use gameroom_core::{OrchestratorError, Port, PortRange};

/// Confirms a port is free at the OS level.
pub trait PortProbe: Send + Sync {
    /// `Ok` when the port could be bound and released again.
    fn probe(&self, port: Port) -> std::io::Result<()>;
}

/// Binds a TCP listener on `host:port` and drops it immediately.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    host: IpAddr,
}

impl TcpProbe {
    pub fn new(host: IpAddr) -> Self {
        Self { host }
    }
}

impl PortProbe for TcpProbe {
    fn probe(&self, port: Port) -> std::io::Result<()> {
        let listener = TcpListener::bind(SocketAddr::new(self.host, port))?;
        drop(listener);
        Ok(())
    }
}

/// Tracks which ports of a range are reserved.
///
/// A port stays reserved from `acquire` until `release`, or until it was found
/// held by a foreign process during a scan (those are never released).
pub struct PortAllocator {
    range: PortRange,
    reserved: BTreeSet<Port>,
    probe: Box<dyn PortProbe>,
}

impl PortAllocator {
    pub fn new(range: PortRange, probe: Box<dyn PortProbe>) -> Self {
        Self {
            range,
            reserved: BTreeSet::new(),
            probe,
        }
    }

    /// Reserve the next free port.
    ///
    /// The scan starts `reserved.len()` ports past `base` and wraps around, so
    /// ports freed below the starting point are still found.
    pub fn acquire(&mut self) -> Result<Port, OrchestratorError> {
        let len = self.range.len();
        let offset = self.reserved.len().min(len);

        for step in 0..len {
            let index = (offset + step) % len;
            let Ok(delta) = Port::try_from(index) else {
                break;
            };
            let port = self.range.base + delta;
            if self.reserved.contains(&port) {
                continue;
            }

            match self.probe.probe(port) {
                Ok(()) => {
                    self.reserved.insert(port);
                    tracing::debug!(port, "port reserved");
                    return Ok(port);
                }
                Err(err) if err.kind() == ErrorKind::AddrInUse => {
                    tracing::debug!(port, "port held outside the orchestrator; skipping");
                    self.reserved.insert(port);
                }
                Err(err) => return Err(OrchestratorError::PortProbe { port, source: err }),
            }
        }

        Err(OrchestratorError::NoPortsAvailable {
            base: self.range.base,
            max: self.range.max,
        })
    }

    /// Drop a reservation. Unknown or already-released ports are a no-op.
    pub fn release(&mut self, port: Port) -> bool {
        let removed = self.reserved.remove(&port);
        if removed {
            tracing::debug!(port, "port released");
        }
        removed
    }

    pub fn is_reserved(&self, port: Port) -> bool {
        self.reserved.contains(&port)
    }

    /// Sorted snapshot of reserved ports.
    pub fn reserved(&self) -> Vec<Port> {
        self.reserved.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.reserved.clear();
    }
}

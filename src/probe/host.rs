//! Probe combining the service registry, process table and port.

use std::sync::Arc;

use tracing::{debug, warn};

use super::port::PortCheck;
use super::process::ProcessTable;
use super::ProcessProbe;
use crate::backends::ServiceBackend;
use crate::model::{ProbeOutcome, ProbeSignal, ServiceSpec};

/// Reads each signal independently; a signal that cannot be read is
/// reported as unavailable instead of failing the whole probe.
pub struct HostProbe {
    registry: Arc<dyn ServiceBackend>,
    processes: Arc<dyn ProcessTable>,
    ports: Arc<dyn PortCheck>,
}

impl HostProbe {
    pub fn new(
        registry: Arc<dyn ServiceBackend>,
        processes: Arc<dyn ProcessTable>,
        ports: Arc<dyn PortCheck>,
    ) -> Self {
        Self {
            registry,
            processes,
            ports,
        }
    }
}

impl ProcessProbe for HostProbe {
    fn probe(&self, spec: &ServiceSpec) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::default();

        let registry_active = match self.registry.query(&spec.name) {
            Ok(status) => {
                outcome.state.exists = status.exists;
                status.active
            }
            Err(e) => {
                warn!(service = %spec.name, error = %e, "Service registry unavailable");
                outcome.unavailable.push(ProbeSignal::Registry);
                false
            }
        };

        match self.processes.find(spec) {
            Ok(pid) => outcome.state.pid = pid,
            Err(e) => {
                warn!(service = %spec.name, error = %e, "Process table unavailable");
                outcome.unavailable.push(ProbeSignal::ProcessTable);
            }
        }
        outcome.registry_active = registry_active;
        outcome.state.running = registry_active || outcome.state.pid.is_some();

        if let Some(port) = spec.port {
            match self.ports.is_listening(port) {
                Ok(listening) => outcome.state.listening_on_port = listening,
                Err(e) => {
                    warn!(service = %spec.name, port, error = %e, "Port check unavailable");
                    outcome.unavailable.push(ProbeSignal::Port);
                }
            }
        }

        debug!(
            service = %spec.name,
            exists = outcome.state.exists,
            running = outcome.state.running,
            pid = ?outcome.state.pid,
            listening = outcome.state.listening_on_port,
            "Probed service"
        );
        outcome
    }
}

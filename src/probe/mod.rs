//! State probes.
//!
//! A probe answers "is it there, is it alive, is it serving" from the
//! service registry, the process table and the liveness port.

mod host;
mod port;
mod process;

pub use host::HostProbe;
pub use port::{PortCheck, TcpPortCheck};
pub use process::{matches_spec, ProcessInfo, ProcessTable, SysinfoProcessTable};

use crate::model::{ProbeOutcome, ServiceSpec};

/// Reads the current state of a service.
///
/// Never fails outright: signals that cannot be read are listed in
/// [`ProbeOutcome::unavailable`] and the caller decides what that means.
pub trait ProcessProbe: Send + Sync {
    fn probe(&self, spec: &ServiceSpec) -> ProbeOutcome;
}

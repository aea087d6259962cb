//! Observed state and reconciliation outcomes.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::error::ErrorKind;

use super::spec::DesiredState;

/// Live-queried truth about a service entry. Rebuilt on every probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ObservedState {
    /// A registration exists in the service registry.
    pub exists: bool,
    /// The managed process is alive.
    pub running: bool,
    /// PID of the matching process, when the process table was readable.
    pub pid: Option<u32>,
    /// Something accepts connections on the liveness port.
    pub listening_on_port: bool,
}

impl ObservedState {
    /// Whether this state fulfils the desired state.
    ///
    /// `port_checked` is false when `spec.port` is unset, in which
    /// case `listening_on_port` is ignored for `Running`.
    pub fn satisfies(&self, desired: DesiredState, port_checked: bool) -> bool {
        match desired {
            DesiredState::Running => {
                self.exists && self.running && (!port_checked || self.listening_on_port)
            }
            // The port alone may belong to an unrelated process.
            DesiredState::Stopped => !self.running,
            DesiredState::Absent => !self.exists,
        }
    }
}

/// An independent signal the probe reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeSignal {
    Registry,
    ProcessTable,
    Port,
}

impl fmt::Display for ProbeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeSignal::Registry => write!(f, "service registry"),
            ProbeSignal::ProcessTable => write!(f, "process table"),
            ProbeSignal::Port => write!(f, "port"),
        }
    }
}

/// Result of one probe: the state plus the signals that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ProbeOutcome {
    pub state: ObservedState,
    /// The service manager itself reports the entry as running. False when
    /// `running` only comes from the process table, e.g. a server started
    /// by hand next to an idle registration.
    pub registry_active: bool,
    pub unavailable: Vec<ProbeSignal>,
}

impl ProbeOutcome {
    pub fn new(state: ObservedState) -> Self {
        Self {
            state,
            registry_active: false,
            unavailable: Vec::new(),
        }
    }

    /// Mark the entry as running under the service manager.
    pub fn with_registry_active(mut self, active: bool) -> Self {
        self.registry_active = active;
        self
    }

    pub fn is_conclusive(&self) -> bool {
        self.unavailable.is_empty()
    }

    pub fn is_missing(&self, signal: ProbeSignal) -> bool {
        self.unavailable.contains(&signal)
    }
}

/// A single backend operation in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Install,
    /// Remove the existing entry, then create it again.
    Reinstall,
    Start,
    Stop,
    /// Kill a matching process that no registry entry owns.
    Terminate,
    Remove,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Install => "install",
            Action::Reinstall => "reinstall",
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Terminate => "terminate",
            Action::Remove => "remove",
        };
        f.write_str(s)
    }
}

/// Summary of what a reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    None,
    Installed,
    Started,
    Stopped,
    Removed,
}

/// Final outcome of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationResult {
    pub run_id: Uuid,
    pub service: String,
    pub desired: DesiredState,
    pub achieved: bool,
    /// Actions that completed, in execution order.
    pub actions: Vec<Action>,
    pub error: Option<ErrorKind>,
    /// Detail for `error`.
    pub message: Option<String>,
    /// Last observed state.
    pub observed: ObservedState,
}

impl ReconciliationResult {
    /// The most significant action taken.
    pub fn action_taken(&self) -> ActionTaken {
        if self
            .actions
            .iter()
            .any(|a| matches!(a, Action::Install | Action::Reinstall))
        {
            ActionTaken::Installed
        } else if self.actions.contains(&Action::Remove) {
            ActionTaken::Removed
        } else if self.actions.contains(&Action::Start) {
            ActionTaken::Started
        } else if self
            .actions
            .iter()
            .any(|a| matches!(a, Action::Stop | Action::Terminate))
        {
            ActionTaken::Stopped
        } else {
            ActionTaken::None
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self.error {
            None => 0,
            Some(kind) => kind.exit_code(),
        }
    }
}

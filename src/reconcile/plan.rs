//! Planning: the minimal action list that moves observed state toward the goal.

use std::fmt;

use serde::Serialize;

use crate::error::WardenError;
use crate::model::{Action, DesiredState, ProbeOutcome};

/// What the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    /// Register (or re-register) and start.
    Install,
    /// Stop and delete the registration.
    Uninstall,
    /// Start an existing registration.
    Start,
    /// Stop the process, keeping the registration.
    Stop,
}

impl Goal {
    pub fn desired(&self) -> DesiredState {
        match self {
            Goal::Install | Goal::Start => DesiredState::Running,
            Goal::Stop => DesiredState::Stopped,
            Goal::Uninstall => DesiredState::Absent,
        }
    }

    /// Install and uninstall write to the system registry.
    pub fn requires_privilege(&self) -> bool {
        matches!(self, Goal::Install | Goal::Uninstall)
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Goal::Install => "install",
            Goal::Uninstall => "uninstall",
            Goal::Start => "start",
            Goal::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// Ordered actions, plus whether to re-probe afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub actions: Vec<Action>,
    pub verify: bool,
}

impl Plan {
    fn nothing() -> Self {
        Self {
            actions: Vec::new(),
            verify: false,
        }
    }

    fn run(actions: Vec<Action>) -> Self {
        Self {
            actions,
            verify: true,
        }
    }

    /// Nothing to execute, only a second look after the settle delay.
    fn wait_and_recheck() -> Self {
        Self::run(Vec::new())
    }

    pub fn is_noop(&self) -> bool {
        self.actions.is_empty() && !self.verify
    }
}

/// Diff the observed state against `goal`.
///
/// `port_checked` is true when the service has a liveness port and the port
/// signal was readable.
pub fn plan(goal: Goal, outcome: &ProbeOutcome, port_checked: bool) -> Result<Plan, WardenError> {
    let observed = &outcome.state;
    let plan = match goal {
        // Install always rewrites the registration so configuration changes land.
        Goal::Install if observed.exists => Plan::run(vec![Action::Reinstall, Action::Start]),
        Goal::Install => Plan::run(vec![Action::Install, Action::Start]),

        Goal::Start if observed.satisfies(DesiredState::Running, port_checked) => Plan::nothing(),
        Goal::Start if !observed.exists => {
            return Err(WardenError::action_failed(
                "the service is not installed; run `warden install` first",
            ))
        }
        // Alive but not serving yet: give it the settle delay before judging.
        Goal::Start if observed.running => Plan::wait_and_recheck(),
        Goal::Start => Plan::run(vec![Action::Start]),

        Goal::Stop if !observed.running => Plan::nothing(),
        // A process can outlive or bypass its entry; stopping the entry alone
        // would leave it serving.
        Goal::Stop if outcome.registry_active && observed.pid.is_some() => {
            Plan::run(vec![Action::Stop, Action::Terminate])
        }
        Goal::Stop if outcome.registry_active => Plan::run(vec![Action::Stop]),
        Goal::Stop => Plan::run(vec![Action::Terminate]),

        Goal::Uninstall if !observed.exists => Plan::nothing(),
        Goal::Uninstall => Plan::run(vec![Action::Stop, Action::Remove]),
    };
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::ObservedState;

    /// A registered entry that is running is also active in the registry.
    fn state(exists: bool, running: bool, listening: bool) -> ProbeOutcome {
        ProbeOutcome::new(ObservedState {
            exists,
            running,
            pid: running.then_some(100),
            listening_on_port: listening,
        })
        .with_registry_active(exists && running)
    }

    #[test]
    fn test_install_fresh() {
        let p = plan(Goal::Install, &state(false, false, false), true).unwrap();
        assert_eq!(p.actions, vec![Action::Install, Action::Start]);
        assert!(p.verify);
    }

    #[test]
    fn test_install_over_existing() {
        let p = plan(Goal::Install, &state(true, true, true), true).unwrap();
        assert_eq!(p.actions, vec![Action::Reinstall, Action::Start]);
    }

    #[test]
    fn test_start_stopped_entry() {
        let p = plan(Goal::Start, &state(true, false, false), true).unwrap();
        assert_eq!(p.actions, vec![Action::Start]);
        assert!(p.verify);
    }

    #[test]
    fn test_start_already_running() {
        let p = plan(Goal::Start, &state(true, true, true), true).unwrap();
        assert!(p.is_noop());
    }

    #[test]
    fn test_start_running_without_listener_rechecks() {
        let p = plan(Goal::Start, &state(true, true, false), true).unwrap();
        assert!(p.actions.is_empty());
        assert!(p.verify);
    }

    #[test]
    fn test_start_without_port_ignores_listener() {
        let p = plan(Goal::Start, &state(true, true, false), false).unwrap();
        assert!(p.is_noop());
    }

    #[test]
    fn test_start_missing_entry() {
        let err = plan(Goal::Start, &state(false, false, false), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ActionFailed);
        assert!(err.to_string().contains("warden install"));
    }

    #[test]
    fn test_stop() {
        assert!(plan(Goal::Stop, &state(true, false, false), true).unwrap().is_noop());
        assert_eq!(
            plan(Goal::Stop, &state(true, true, true), true).unwrap().actions,
            vec![Action::Stop, Action::Terminate]
        );
        assert_eq!(
            plan(Goal::Stop, &state(false, true, true), true).unwrap().actions,
            vec![Action::Terminate]
        );
    }

    #[test]
    fn test_stop_active_entry_without_pid() {
        let mut outcome = state(true, true, true);
        outcome.state.pid = None;
        assert_eq!(
            plan(Goal::Stop, &outcome, true).unwrap().actions,
            vec![Action::Stop]
        );
    }

    #[test]
    fn test_stop_idle_entry_with_stray_process() {
        // Registered but idle, while a matching process serves on its own.
        let outcome = state(true, true, true).with_registry_active(false);
        assert_eq!(
            plan(Goal::Stop, &outcome, true).unwrap().actions,
            vec![Action::Terminate]
        );
    }

    #[test]
    fn test_uninstall() {
        assert!(plan(Goal::Uninstall, &state(false, false, false), true)
            .unwrap()
            .is_noop());
        assert_eq!(
            plan(Goal::Uninstall, &state(true, false, false), true).unwrap().actions,
            vec![Action::Stop, Action::Remove]
        );
    }

    #[test]
    fn test_goal_mapping() {
        assert_eq!(Goal::Install.desired(), DesiredState::Running);
        assert_eq!(Goal::Stop.desired(), DesiredState::Stopped);
        assert_eq!(Goal::Uninstall.desired(), DesiredState::Absent);
        assert!(Goal::Uninstall.requires_privilege());
        assert!(!Goal::Start.requires_privilege());
    }
}

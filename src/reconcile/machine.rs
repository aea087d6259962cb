//! The reconciliation state machine.
//!
//! Probing -> Planning -> Executing -> Verifying -> Done, with Failed
//! reachable from every phase. Each run is synchronous and makes a single
//! pass; there is no rollback of completed actions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::plan::{plan, Goal, Plan};
use crate::backends::ServiceBackend;
use crate::error::{ErrorKind, WardenError};
use crate::model::{
    Action, DesiredState, ObservedState, ProbeOutcome, ProbeSignal, ReconciliationResult,
    ServiceSpec,
};
use crate::platform::{CancelToken, PrivilegeCheck};
use crate::probe::{ProcessProbe, ProcessTable};

/// Fixed settle delay before the verification probe.
pub const DEFAULT_VERIFY_DELAY: Duration = Duration::from_secs(3);

const CANCEL_POLL: Duration = Duration::from_millis(100);

#[derive(Debug)]
enum Phase {
    Probing,
    Planning(ProbeOutcome),
    Executing(Plan),
    Verifying,
    Done,
    Failed(ErrorKind, String),
}

/// Bookkeeping for one run.
struct Run {
    id: Uuid,
    actions: Vec<Action>,
    observed: ObservedState,
    port_checked: bool,
}

pub struct Reconciler {
    backend: Arc<dyn ServiceBackend>,
    probe: Arc<dyn ProcessProbe>,
    processes: Arc<dyn ProcessTable>,
    privileges: Arc<dyn PrivilegeCheck>,
    verify_delay: Duration,
    cancel: CancelToken,
}

impl Reconciler {
    pub fn new(
        backend: Arc<dyn ServiceBackend>,
        probe: Arc<dyn ProcessProbe>,
        processes: Arc<dyn ProcessTable>,
        privileges: Arc<dyn PrivilegeCheck>,
    ) -> Self {
        Self {
            backend,
            probe,
            processes,
            privileges,
            verify_delay: DEFAULT_VERIFY_DELAY,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Drive `spec` toward `goal` and report how it ended.
    pub fn reconcile(&self, spec: &ServiceSpec, goal: Goal) -> ReconciliationResult {
        let mut run = Run {
            id: Uuid::new_v4(),
            actions: Vec::new(),
            observed: ObservedState::default(),
            port_checked: spec.port.is_some(),
        };
        let desired = goal.desired();

        info!(
            run_id = %run.id,
            service = %spec.name,
            goal = %goal,
            desired = %desired,
            "Reconciliation started"
        );

        let mut phase = Phase::Probing;
        loop {
            debug!(run_id = %run.id, phase = ?phase, "Entering phase");
            phase = match phase {
                Phase::Probing => self.probing(spec, goal, &mut run),
                Phase::Planning(outcome) => self.planning(goal, &outcome, &mut run),
                Phase::Executing(plan) => self.executing(spec, plan, &mut run),
                Phase::Verifying => self.verifying(spec, desired, &mut run),
                Phase::Done => {
                    info!(
                        run_id = %run.id,
                        service = %spec.name,
                        actions = ?run.actions,
                        "Reconciliation done"
                    );
                    return finish(spec, desired, run, None);
                }
                Phase::Failed(kind, message) => {
                    warn!(
                        run_id = %run.id,
                        service = %spec.name,
                        error_code = kind.code(),
                        error = %message,
                        actions = ?run.actions,
                        "Reconciliation failed"
                    );
                    return finish(spec, desired, run, Some((kind, message)));
                }
            };
        }
    }

    /// Probe and plan without executing anything.
    pub fn dry_run(&self, spec: &ServiceSpec, goal: Goal) -> Result<(ProbeOutcome, Plan), WardenError> {
        let outcome = self.probe.probe(spec);
        if outcome.is_missing(ProbeSignal::Registry) {
            return Err(registry_unavailable());
        }
        let port_checked = spec.port.is_some() && !outcome.is_missing(ProbeSignal::Port);
        let plan = plan(goal, &outcome, port_checked)?;
        Ok((outcome, plan))
    }

    fn probing(&self, spec: &ServiceSpec, goal: Goal, run: &mut Run) -> Phase {
        if goal.requires_privilege() && !self.privileges.is_elevated() {
            return Phase::Failed(
                ErrorKind::PrivilegeRequired,
                format!("`{}` needs administrator privileges", goal),
            );
        }

        let outcome = self.probe.probe(spec);
        run.observed = outcome.state;
        if outcome.is_missing(ProbeSignal::Registry) {
            let err = registry_unavailable();
            return Phase::Failed(err.kind(), err.to_string());
        }
        if outcome.is_missing(ProbeSignal::Port) {
            run.port_checked = false;
        }
        Phase::Planning(outcome)
    }

    fn planning(&self, goal: Goal, outcome: &ProbeOutcome, run: &mut Run) -> Phase {
        match plan(goal, outcome, run.port_checked) {
            Ok(plan) if plan.is_noop() => Phase::Done,
            Ok(plan) if plan.actions.is_empty() => Phase::Verifying,
            Ok(plan) => {
                info!(run_id = %run.id, actions = ?plan.actions, "Plan computed");
                Phase::Executing(plan)
            }
            Err(e) => Phase::Failed(e.kind(), e.to_string()),
        }
    }

    fn executing(&self, spec: &ServiceSpec, plan: Plan, run: &mut Run) -> Phase {
        for action in plan.actions {
            if self.cancel.is_cancelled() {
                return Phase::Failed(ErrorKind::Cancelled, cancelled_message(&run.actions));
            }

            let started = Instant::now();
            if let Err(e) = self.execute(action, spec, run.observed.pid) {
                return Phase::Failed(e.kind(), format!("{} failed: {}", action, e));
            }
            info!(
                run_id = %run.id,
                service = %spec.name,
                action = %action,
                backend = self.backend.name(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Action completed"
            );
            run.actions.push(action);
        }

        if plan.verify {
            Phase::Verifying
        } else {
            Phase::Done
        }
    }

    fn execute(&self, action: Action, spec: &ServiceSpec, pid: Option<u32>) -> Result<(), WardenError> {
        match action {
            Action::Install | Action::Reinstall => self.backend.install(spec),
            Action::Start => self.backend.start(&spec.name),
            Action::Stop => self.backend.stop(&spec.name),
            Action::Remove => self.backend.remove(&spec.name),
            Action::Terminate => match pid {
                Some(pid) => self.processes.terminate(pid),
                None => Err(WardenError::action_failed(
                    "a matching process is running but its PID is unknown",
                )),
            },
        }
    }

    fn verifying(&self, spec: &ServiceSpec, desired: DesiredState, run: &mut Run) -> Phase {
        if !self.settle() {
            return Phase::Failed(ErrorKind::Cancelled, cancelled_message(&run.actions));
        }

        let outcome = self.probe.probe(spec);
        run.observed = outcome.state;
        if outcome.is_missing(ProbeSignal::Registry) {
            let err = registry_unavailable();
            return Phase::Failed(err.kind(), err.to_string());
        }
        let port_checked = run.port_checked && !outcome.is_missing(ProbeSignal::Port);

        if outcome.state.satisfies(desired, port_checked) {
            Phase::Done
        } else {
            Phase::Failed(
                ErrorKind::VerificationTimeout,
                mismatch_message(spec, desired, &outcome.state, self.verify_delay),
            )
        }
    }

    /// Wait out the verify delay; false if cancelled meanwhile.
    fn settle(&self) -> bool {
        let deadline = Instant::now() + self.verify_delay;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(CANCEL_POLL.min(deadline - now));
        }
    }
}

fn registry_unavailable() -> WardenError {
    WardenError::reconcile(
        ErrorKind::ProbeUnavailable,
        "the service registry could not be queried",
    )
}

fn cancelled_message(done: &[Action]) -> String {
    if done.is_empty() {
        "interrupted before any action ran".to_string()
    } else {
        let done: Vec<String> = done.iter().map(ToString::to_string).collect();
        format!("interrupted after: {}", done.join(", "))
    }
}

fn mismatch_message(
    spec: &ServiceSpec,
    desired: DesiredState,
    state: &ObservedState,
    waited: Duration,
) -> String {
    let detail = match desired {
        DesiredState::Running if !state.exists => "the service entry is missing".to_string(),
        DesiredState::Running if !state.running => "the process is not running".to_string(),
        DesiredState::Running => match spec.port {
            Some(port) => format!("the process is running but nothing listens on port {}", port),
            None => "the process is not serving".to_string(),
        },
        DesiredState::Stopped => match state.pid {
            Some(pid) => format!("the process is still running (pid {})", pid),
            None => "the process is still running".to_string(),
        },
        DesiredState::Absent => "the service entry still exists".to_string(),
    };
    format!("{} after waiting {}s", detail, waited.as_secs_f32())
}

fn finish(
    spec: &ServiceSpec,
    desired: DesiredState,
    run: Run,
    failure: Option<(ErrorKind, String)>,
) -> ReconciliationResult {
    let (error, message) = match failure {
        Some((kind, message)) => (Some(kind), Some(message)),
        None => (None, None),
    };
    ReconciliationResult {
        run_id: run.id,
        service: spec.name.clone(),
        desired,
        achieved: error.is_none(),
        actions: run.actions,
        error,
        message,
        observed: run.observed,
    }
}

//! Operator-facing output.
//!
//! Plain text by default, or one JSON document per command with `--json`.
//! Diagnostics go through tracing on stderr; this module owns stdout.

use std::io::{self, Write};

use serde::Serialize;

use crate::error::{ErrorKind, WardenError};
use crate::model::{
    ActionTaken, DesiredState, ObservedState, ProbeOutcome, ProbeSignal, ReconciliationResult,
    ServiceSpec,
};
use crate::reconcile::{Goal, Plan};

/// URL the managed service is reachable on, if it has a port.
pub fn access_url(spec: &ServiceSpec) -> Option<String> {
    spec.port.map(|port| format!("http://127.0.0.1:{}", port))
}

#[derive(Serialize)]
struct ResultReport<'a> {
    command: Goal,
    #[serde(flatten)]
    result: &'a ReconciliationResult,
    action_taken: ActionTaken,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_url: Option<String>,
}

#[derive(Serialize)]
struct PlanReport<'a> {
    command: Goal,
    service: &'a str,
    dry_run: bool,
    observed: &'a ObservedState,
    unavailable: Vec<String>,
    plan: &'a Plan,
}

#[derive(Serialize)]
struct StatusReport<'a> {
    service: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    backend: Option<&'a str>,
    observed: &'a ObservedState,
    unavailable: Vec<String>,
    running: bool,
}

#[derive(Serialize)]
struct ErrorReport {
    error_code: &'static str,
    message: String,
    hint: &'static str,
}

pub struct Reporter<W: Write> {
    out: W,
    json: bool,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_json<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut self.out, value)?;
        writeln!(self.out)
    }

    /// Outcome of a reconciliation run.
    pub fn result(
        &mut self,
        goal: Goal,
        spec: &ServiceSpec,
        result: &ReconciliationResult,
    ) -> io::Result<()> {
        let serving = result.achieved && result.desired == DesiredState::Running;
        let url = if serving { access_url(spec) } else { None };

        if self.json {
            return self.write_json(&ResultReport {
                command: goal,
                result,
                action_taken: result.action_taken(),
                error_code: result.error.map(|k| k.code()),
                hint: result.error.map(|k| k.remediation()),
                access_url: url,
            });
        }

        match result.error {
            None => {
                writeln!(
                    self.out,
                    "[OK] {} {}: {}",
                    goal,
                    result.service,
                    summary(result)
                )?;
                if !result.actions.is_empty() {
                    writeln!(self.out, "     Actions: {}", join(&result.actions))?;
                }
                if let Some(url) = url {
                    writeln!(self.out, "     Access: {}", url)?;
                }
            }
            Some(kind) => {
                writeln!(
                    self.out,
                    "[FAILED] {} {}: {}",
                    goal,
                    result.service,
                    result.message.as_deref().unwrap_or("unknown error")
                )?;
                writeln!(self.out, "     Error: {} ({})", kind, kind.code())?;
                if !result.actions.is_empty() {
                    writeln!(self.out, "     Completed before failure: {}", join(&result.actions))?;
                }
                writeln!(self.out, "     Hint: {}", kind.remediation())?;
            }
        }
        Ok(())
    }

    /// What a run would do, without doing it.
    pub fn plan(
        &mut self,
        goal: Goal,
        spec: &ServiceSpec,
        outcome: &ProbeOutcome,
        plan: &Plan,
    ) -> io::Result<()> {
        if self.json {
            return self.write_json(&PlanReport {
                command: goal,
                service: &spec.name,
                dry_run: true,
                observed: &outcome.state,
                unavailable: unavailable(outcome),
                plan,
            });
        }

        writeln!(self.out, "[DRY RUN] {} {}", goal, spec.name)?;
        writeln!(self.out, "     Observed: {}", describe(&outcome.state, spec))?;
        if plan.actions.is_empty() {
            let next = if plan.verify {
                "re-check after the settle delay"
            } else {
                "nothing to do"
            };
            writeln!(self.out, "     Plan: {}", next)?;
        } else {
            writeln!(self.out, "     Plan: {}", join(&plan.actions))?;
        }
        Ok(())
    }

    /// Current state of the service.
    pub fn status(
        &mut self,
        spec: &ServiceSpec,
        outcome: &ProbeOutcome,
        backend: Option<&str>,
    ) -> io::Result<()> {
        let port_checked = spec.port.is_some() && !outcome.is_missing(ProbeSignal::Port);
        let running = outcome.state.satisfies(DesiredState::Running, port_checked);

        if self.json {
            return self.write_json(&StatusReport {
                service: &spec.name,
                backend,
                observed: &outcome.state,
                unavailable: unavailable(outcome),
                running,
            });
        }

        writeln!(self.out, "{}: {}", spec.name, describe(&outcome.state, spec))?;
        if let Some(backend) = backend {
            writeln!(self.out, "     Backend: {}", backend)?;
        }
        for signal in &outcome.unavailable {
            writeln!(self.out, "     Warning: {} could not be read", signal)?;
        }
        if running {
            if let Some(url) = access_url(spec) {
                writeln!(self.out, "     Access: {}", url)?;
            }
        }
        Ok(())
    }

    /// An error that ended the command before any reconciliation.
    pub fn error(&mut self, err: &WardenError) -> io::Result<()> {
        let (code, hint) = match err {
            WardenError::Config { .. }
            | WardenError::Validation { .. }
            | WardenError::Template { .. } => (
                "INVALID_CONFIG",
                "Check the configuration file and command line options.",
            ),
            _ => {
                let kind: ErrorKind = err.kind();
                (kind.code(), kind.remediation())
            }
        };
        if self.json {
            return self.write_json(&ErrorReport {
                error_code: code,
                message: err.to_string(),
                hint,
            });
        }
        writeln!(self.out, "[FAILED] {}", err)?;
        writeln!(self.out, "     Hint: {}", hint)
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn unavailable(outcome: &ProbeOutcome) -> Vec<String> {
    outcome.unavailable.iter().map(ToString::to_string).collect()
}

fn summary(result: &ReconciliationResult) -> &'static str {
    match (result.action_taken(), result.desired) {
        (ActionTaken::Installed, _) => "installed and running",
        (ActionTaken::Started, _) => "started",
        (ActionTaken::Stopped, _) => "stopped",
        (ActionTaken::Removed, _) => "removed",
        (ActionTaken::None, DesiredState::Running) => "already running",
        (ActionTaken::None, DesiredState::Stopped) => "already stopped",
        (ActionTaken::None, DesiredState::Absent) => "not installed, nothing to remove",
    }
}

fn describe(state: &ObservedState, spec: &ServiceSpec) -> String {
    let mut parts = Vec::new();
    parts.push((if state.exists { "installed" } else { "not installed" }).to_string());
    parts.push(match (state.running, state.pid) {
        (true, Some(pid)) => format!("running (pid {})", pid),
        (true, None) => "running".to_string(),
        (false, _) => "not running".to_string(),
    });
    if let Some(port) = spec.port {
        parts.push(if state.listening_on_port {
            format!("listening on port {}", port)
        } else {
            format!("nothing listening on port {}", port)
        });
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Action;
    use uuid::Uuid;

    fn spec() -> ServiceSpec {
        ServiceSpec::new("gemini-api", "/usr/bin/python3", "/srv/app").with_port(8000)
    }

    fn result(actions: Vec<Action>, error: Option<ErrorKind>) -> ReconciliationResult {
        ReconciliationResult {
            run_id: Uuid::nil(),
            service: "gemini-api".to_string(),
            desired: DesiredState::Running,
            achieved: error.is_none(),
            actions,
            error,
            message: error.map(|_| "the process is running but nothing listens on port 8000 after waiting 3s".to_string()),
            observed: ObservedState::default(),
        }
    }

    fn render<F>(json: bool, f: F) -> String
    where
        F: FnOnce(&mut Reporter<Vec<u8>>) -> io::Result<()>,
    {
        let mut reporter = Reporter::new(Vec::new(), json);
        f(&mut reporter).unwrap();
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn test_success_includes_access_url() {
        let out = render(false, |r| {
            r.result(Goal::Install, &spec(), &result(vec![Action::Install, Action::Start], None))
        });
        assert!(out.starts_with("[OK] install gemini-api: installed and running"));
        assert!(out.contains("Actions: install, start"));
        assert!(out.contains("Access: http://127.0.0.1:8000"));
    }

    #[test]
    fn test_already_running() {
        let out = render(false, |r| r.result(Goal::Start, &spec(), &result(vec![], None)));
        assert!(out.contains("already running"));
        assert!(!out.contains("Actions:"));
    }

    #[test]
    fn test_failure_has_hint() {
        let out = render(false, |r| {
            r.result(
                Goal::Start,
                &spec(),
                &result(vec![Action::Start], Some(ErrorKind::VerificationTimeout)),
            )
        });
        assert!(out.starts_with("[FAILED] start gemini-api:"));
        assert!(out.contains("VERIFICATION_TIMEOUT"));
        assert!(out.contains("Completed before failure: start"));
        assert!(out.contains(ErrorKind::VerificationTimeout.remediation()));
        assert!(!out.contains("Access:"));
    }

    #[test]
    fn test_json_result() {
        let out = render(true, |r| {
            r.result(Goal::Install, &spec(), &result(vec![Action::Install, Action::Start], None))
        });
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["command"], "install");
        assert_eq!(json["achieved"], true);
        assert_eq!(json["action_taken"], "installed");
        assert_eq!(json["actions"], serde_json::json!(["install", "start"]));
        assert_eq!(json["access_url"], "http://127.0.0.1:8000");
        assert!(json.get("error_code").is_none());
    }

    #[test]
    fn test_json_failure() {
        let out = render(true, |r| {
            r.result(Goal::Start, &spec(), &result(vec![], Some(ErrorKind::ProbeUnavailable)))
        });
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["error"], "probe_unavailable");
        assert_eq!(json["error_code"], "PROBE_UNAVAILABLE");
        assert!(json["hint"].is_string());
    }

    #[test]
    fn test_status_lines() {
        let outcome = ProbeOutcome {
            state: ObservedState {
                exists: true,
                running: true,
                pid: Some(42),
                listening_on_port: true,
            },
            registry_active: true,
            unavailable: vec![],
        };
        let out = render(false, |r| r.status(&spec(), &outcome, Some("systemd")));
        assert!(out.contains("gemini-api: installed, running (pid 42), listening on port 8000"));
        assert!(out.contains("Backend: systemd"));
        assert!(out.contains("Access: http://127.0.0.1:8000"));
    }

    #[test]
    fn test_status_warns_on_missing_signal() {
        let outcome = ProbeOutcome {
            state: ObservedState::default(),
            registry_active: false,
            unavailable: vec![ProbeSignal::ProcessTable],
        };
        let out = render(false, |r| r.status(&spec(), &outcome, None));
        assert!(out.contains("not installed, not running, nothing listening on port 8000"));
        assert!(out.contains("Warning: process table could not be read"));
    }

    #[test]
    fn test_dry_run_plan() {
        let outcome = ProbeOutcome::new(ObservedState::default());
        let plan = crate::reconcile::plan(Goal::Install, &outcome, true).unwrap();
        let out = render(false, |r| r.plan(Goal::Install, &spec(), &outcome, &plan));
        assert!(out.starts_with("[DRY RUN] install gemini-api"));
        assert!(out.contains("Plan: install, start"));
    }

    #[test]
    fn test_error_report() {
        let err = WardenError::Config {
            message: "Failed to read config file 'warden.toml'".to_string(),
        };
        let out = render(false, |r| r.error(&err));
        assert!(out.contains("[FAILED] Configuration error"));
        assert!(out.contains("Hint: Check the configuration file"));

        let err = WardenError::reconcile(ErrorKind::BackendUnavailable, "no systemd");
        let out = render(true, |r| r.error(&err));
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["error_code"], "BACKEND_UNAVAILABLE");
    }
}

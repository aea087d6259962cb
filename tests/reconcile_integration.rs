//! Integration tests for the reconciler.
//!
//! Drives the public API against the in-memory backend, with a probe whose
//! process and port signals follow the backend's state the way a real
//! service would.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use warden::backends::{FallbackChain, InMemoryBackend, ServiceBackend};
use warden::error::{ErrorKind, WardenError};
use warden::model::{Action, ActionTaken, ObservedState, ProbeOutcome, ServiceSpec};
use warden::platform::{CancelToken, StaticPrivileges};
use warden::probe::{HostProbe, PortCheck, ProcessProbe, ProcessTable};
use warden::reconcile::{Goal, Reconciler};

const VERIFY_DELAY: Duration = Duration::from_millis(50);

/// The managed process exists exactly when the registry says it is active.
struct FollowingProcesses {
    backend: Arc<dyn ServiceBackend>,
    orphan: Mutex<Option<u32>>,
}

impl ProcessTable for FollowingProcesses {
    fn find(&self, spec: &ServiceSpec) -> Result<Option<u32>, WardenError> {
        if let Some(pid) = *self.orphan.lock().unwrap() {
            return Ok(Some(pid));
        }
        let active = self.backend.query(&spec.name)?.active;
        Ok(active.then_some(4242))
    }

    fn terminate(&self, pid: u32) -> Result<(), WardenError> {
        let mut orphan = self.orphan.lock().unwrap();
        if *orphan == Some(pid) {
            *orphan = None;
        }
        Ok(())
    }
}

/// The port listens while the service is active, unless told the
/// process never binds it.
struct FollowingPort {
    backend: Arc<dyn ServiceBackend>,
    service: String,
    binds: AtomicBool,
}

impl PortCheck for FollowingPort {
    fn is_listening(&self, _port: u16) -> Result<bool, WardenError> {
        Ok(self.binds.load(Ordering::SeqCst) && self.backend.query(&self.service)?.active)
    }
}

/// Counts probes and records what each one saw.
struct CountingProbe {
    inner: HostProbe,
    count: AtomicUsize,
    seen: Mutex<Vec<ObservedState>>,
}

impl ProcessProbe for CountingProbe {
    fn probe(&self, spec: &ServiceSpec) -> ProbeOutcome {
        self.count.fetch_add(1, Ordering::SeqCst);
        let outcome = self.inner.probe(spec);
        self.seen.lock().unwrap().push(outcome.state);
        outcome
    }
}

struct TestHost {
    backend: Arc<InMemoryBackend>,
    processes: Arc<FollowingProcesses>,
    port: Arc<FollowingPort>,
    probe: Arc<CountingProbe>,
}

impl TestHost {
    fn new(backend: InMemoryBackend) -> Self {
        let backend = Arc::new(backend);
        let processes = Arc::new(FollowingProcesses {
            backend: backend.clone(),
            orphan: Mutex::new(None),
        });
        let port = Arc::new(FollowingPort {
            backend: backend.clone(),
            service: "svc".to_string(),
            binds: AtomicBool::new(true),
        });
        let probe = Arc::new(CountingProbe {
            inner: HostProbe::new(backend.clone(), processes.clone(), port.clone()),
            count: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        });
        Self {
            backend,
            processes,
            port,
            probe,
        }
    }

    fn reconciler(&self, elevated: bool) -> Reconciler {
        Reconciler::new(
            self.backend.clone(),
            self.probe.clone(),
            self.processes.clone(),
            Arc::new(StaticPrivileges(elevated)),
        )
        .with_verify_delay(VERIFY_DELAY)
    }

    fn probes(&self) -> usize {
        self.probe.count.load(Ordering::SeqCst)
    }

    fn mutating_calls(&self) -> Vec<String> {
        self.backend
            .calls()
            .into_iter()
            .filter(|c| !c.starts_with("query"))
            .collect()
    }
}

fn spec() -> ServiceSpec {
    ServiceSpec::new("svc", "/usr/bin/python3", "/srv/app")
        .with_args(["server.py"])
        .with_port(8000)
}

fn serving() -> ObservedState {
    ObservedState {
        exists: true,
        running: true,
        pid: Some(4242),
        listening_on_port: true,
    }
}

#[test]
fn test_install_on_clean_host() {
    let host = TestHost::new(InMemoryBackend::new());

    let result = host.reconciler(true).reconcile(&spec(), Goal::Install);

    assert!(result.achieved, "{:?}", result.message);
    assert_eq!(result.actions, vec![Action::Install, Action::Start]);
    assert_eq!(result.observed, serving());
    assert_eq!(result.exit_code(), 0);
    assert_eq!(host.mutating_calls(), vec!["install svc", "start svc"]);
    assert_eq!(host.backend.installed_spec("svc"), Some(spec()));
}

#[test]
fn test_install_over_running_service_recreates_it() {
    let host = TestHost::new(InMemoryBackend::new().with_entry("svc", true));

    let result = host.reconciler(true).reconcile(&spec(), Goal::Install);

    assert!(result.achieved);
    assert_eq!(result.actions, vec![Action::Reinstall, Action::Start]);
    assert_eq!(result.action_taken(), ActionTaken::Installed);
    assert_eq!(result.observed, serving());
}

#[test]
fn test_install_is_idempotent() {
    let host = TestHost::new(InMemoryBackend::new());
    let reconciler = host.reconciler(true);

    let first = reconciler.reconcile(&spec(), Goal::Install);
    let second = reconciler.reconcile(&spec(), Goal::Install);

    assert!(first.achieved);
    assert!(second.achieved);
    assert_eq!(first.observed, second.observed);
    assert_ne!(first.run_id, second.run_id);
}

#[test]
fn test_stop_when_nothing_listens() {
    let host = TestHost::new(InMemoryBackend::new().with_entry("svc", false));

    let result = host.reconciler(false).reconcile(&spec(), Goal::Stop);

    assert!(result.achieved);
    assert_eq!(result.action_taken(), ActionTaken::None);
    assert_eq!(result.exit_code(), 0);
    assert_eq!(host.probes(), 1);
    assert!(host.mutating_calls().is_empty());
}

#[test]
fn test_install_without_privilege_touches_nothing() {
    let host = TestHost::new(InMemoryBackend::new());

    let result = host.reconciler(false).reconcile(&spec(), Goal::Install);

    assert_eq!(result.error, Some(ErrorKind::PrivilegeRequired));
    assert_eq!(result.exit_code(), 1);
    assert!(result.actions.is_empty());
    assert!(host.backend.calls().is_empty());
    assert_eq!(host.probes(), 0);
}

#[test]
fn test_uninstall_never_installed() {
    let host = TestHost::new(InMemoryBackend::new());

    let result = host.reconciler(true).reconcile(&spec(), Goal::Uninstall);

    assert!(result.achieved);
    assert_eq!(result.action_taken(), ActionTaken::None);
    assert!(result.error.is_none());
    assert!(host.mutating_calls().is_empty());
}

#[test]
fn test_uninstall_installed_service() {
    let host = TestHost::new(InMemoryBackend::new().with_entry("svc", true));

    let result = host.reconciler(true).reconcile(&spec(), Goal::Uninstall);

    assert!(result.achieved);
    assert_eq!(result.actions, vec![Action::Stop, Action::Remove]);
    assert!(!result.observed.exists);
    assert!(host.backend.status("svc").is_none());
}

#[test]
fn test_running_without_listener_waits_and_rechecks_once() {
    let host = TestHost::new(InMemoryBackend::new().with_entry("svc", true));
    host.port.binds.store(false, Ordering::SeqCst);

    let started = Instant::now();
    let result = host.reconciler(false).reconcile(&spec(), Goal::Start);

    assert!(started.elapsed() >= VERIFY_DELAY);
    assert_eq!(host.probes(), 2);
    assert_eq!(result.error, Some(ErrorKind::VerificationTimeout));
    assert!(result.actions.is_empty());
    assert!(host.mutating_calls().is_empty());
}

#[test]
fn test_start_that_never_comes_up() {
    let host = TestHost::new(InMemoryBackend::new().inert().with_entry("svc", false));

    let result = host.reconciler(false).reconcile(&spec(), Goal::Start);

    assert_eq!(result.error, Some(ErrorKind::VerificationTimeout));
    assert_eq!(result.actions, vec![Action::Start]);
    assert!(result.message.unwrap().contains("not running"));
    assert_eq!(host.probes(), 2);
}

#[test]
fn test_start_missing_service() {
    let host = TestHost::new(InMemoryBackend::new());

    let result = host.reconciler(false).reconcile(&spec(), Goal::Start);

    assert_eq!(result.error, Some(ErrorKind::ActionFailed));
    assert!(result.message.unwrap().contains("warden install"));
    assert!(host.mutating_calls().is_empty());
}

#[test]
fn test_failed_action_aborts_the_rest() {
    let host = TestHost::new(InMemoryBackend::new().fail_on("start"));

    let result = host.reconciler(true).reconcile(&spec(), Goal::Install);

    assert_eq!(result.error, Some(ErrorKind::ActionFailed));
    assert_eq!(result.actions, vec![Action::Install]);
    assert_eq!(host.probes(), 1);
    // No rollback of the completed install.
    assert!(host.backend.status("svc").is_some());
}

#[test]
fn test_stop_orphan_process() {
    let host = TestHost::new(InMemoryBackend::new());
    *host.processes.orphan.lock().unwrap() = Some(999);

    let result = host.reconciler(false).reconcile(&spec(), Goal::Stop);

    assert!(result.achieved);
    assert_eq!(result.actions, vec![Action::Terminate]);
    assert!(host.processes.orphan.lock().unwrap().is_none());
}

#[test]
fn test_observed_state_is_reprobed_after_actions() {
    let host = TestHost::new(InMemoryBackend::new());

    host.reconciler(true).reconcile(&spec(), Goal::Install);

    let seen = host.probe.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(!seen[0].exists);
    assert_eq!(seen[1], serving());
}

#[test]
fn test_cancellation_reports_nothing_done() {
    let host = TestHost::new(InMemoryBackend::new());
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = host
        .reconciler(true)
        .with_cancel_token(cancel)
        .reconcile(&spec(), Goal::Install);

    assert_eq!(result.error, Some(ErrorKind::Cancelled));
    assert!(result.message.unwrap().contains("before any action"));
    assert!(host.mutating_calls().is_empty());
}

#[test]
fn test_fallback_chain_installs_on_second_backend() {
    let system = Arc::new(InMemoryBackend::named("system").fail_on("install"));
    let user = Arc::new(InMemoryBackend::named("user"));
    let chain: Arc<dyn ServiceBackend> =
        Arc::new(FallbackChain::new(vec![system.clone(), user.clone()]));

    let processes = Arc::new(FollowingProcesses {
        backend: chain.clone(),
        orphan: Mutex::new(None),
    });
    let port = Arc::new(FollowingPort {
        backend: chain.clone(),
        service: "svc".to_string(),
        binds: AtomicBool::new(true),
    });
    let probe = Arc::new(HostProbe::new(chain.clone(), processes.clone(), port));
    let reconciler = Reconciler::new(chain, probe, processes, Arc::new(StaticPrivileges(true)))
        .with_verify_delay(VERIFY_DELAY);

    let result = reconciler.reconcile(&spec(), Goal::Install);

    assert!(result.achieved, "{:?}", result.message);
    assert!(system.status("svc").is_none());
    assert_eq!(
        user.status("svc"),
        Some(warden::backends::RegistryStatus::installed(true))
    );
}

#[test]
fn test_stop_idle_entry_with_stray_process() {
    // Started by hand next to a registration the manager reports as stopped.
    let host = TestHost::new(InMemoryBackend::new().with_entry("svc", false));
    *host.processes.orphan.lock().unwrap() = Some(999);

    let result = host.reconciler(false).reconcile(&spec(), Goal::Stop);

    assert!(result.achieved, "{:?}", result.message);
    assert_eq!(result.actions, vec![Action::Terminate]);
    assert!(host.processes.orphan.lock().unwrap().is_none());
    assert!(!result.observed.running);
    assert!(host.mutating_calls().is_empty());
}

#[test]
fn test_stop_active_entry_also_ends_its_process() {
    let host = TestHost::new(InMemoryBackend::new().with_entry("svc", true));

    let result = host.reconciler(false).reconcile(&spec(), Goal::Stop);

    assert!(result.achieved, "{:?}", result.message);
    assert_eq!(result.actions, vec![Action::Stop, Action::Terminate]);
    assert_eq!(host.mutating_calls(), vec!["stop svc"]);
}

//! Backend selection by platform capability.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::chain::FallbackChain;
use super::event_trigger::EventTriggerBackend;
use super::nssm::NssmBackend;
use super::resume::ResumeHookBackend;
use super::systemd::{SystemdBackend, SystemdScope};
use super::task_scheduler::{TaskScope, TaskSchedulerBackend};
use super::traits::ServiceBackend;
use crate::config::BackendsConfig;
use crate::error::{ErrorKind, WardenError};
use crate::executor::CommandRunner;
use crate::templates::TemplateEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }

    /// Whether a restart-after-resume hook exists on this platform.
    pub fn supports_resume_hook(&self) -> bool {
        matches!(self, Platform::Windows)
    }
}

/// Build the fallback chain for `platform`.
///
/// Linux: system systemd unit, then user unit.
/// Windows: SYSTEM task, then current-user task, then NSSM, each paired
/// with a resume trigger.
pub fn detect_backend(
    platform: Platform,
    config: &BackendsConfig,
    runner: Arc<dyn CommandRunner>,
    templates: TemplateEngine,
) -> Result<FallbackChain, WardenError> {
    let backends: Vec<Arc<dyn ServiceBackend>> = match platform {
        Platform::Linux => {
            if !Path::new("/run/systemd/system").exists() {
                return Err(WardenError::reconcile(
                    ErrorKind::BackendUnavailable,
                    "this system was not booted with systemd",
                ));
            }
            vec![
                Arc::new(SystemdBackend::new(
                    SystemdScope::System,
                    &config.systemd_unit_dir,
                    runner.clone(),
                    templates.clone(),
                )),
                Arc::new(SystemdBackend::new(
                    SystemdScope::User,
                    &config.systemd_user_unit_dir,
                    runner,
                    templates,
                )),
            ]
        }
        Platform::Windows => windows_chain(config, runner, templates),
        Platform::Other => {
            return Err(WardenError::reconcile(
                ErrorKind::BackendUnavailable,
                "no supported service manager on this platform",
            ))
        }
    };

    let names: Vec<&str> = backends.iter().map(|b| b.name()).collect();
    debug!(?platform, backends = ?names, "Backend chain assembled");
    Ok(FallbackChain::new(backends))
}

fn windows_chain(
    config: &BackendsConfig,
    runner: Arc<dyn CommandRunner>,
    templates: TemplateEngine,
) -> Vec<Arc<dyn ServiceBackend>> {
    let with_hook = |primary: Arc<dyn ServiceBackend>, scope: TaskScope| -> Arc<dyn ServiceBackend> {
        let hook = Arc::new(EventTriggerBackend::new(
            scope,
            runner.clone(),
            templates.clone(),
        ));
        Arc::new(ResumeHookBackend::new(primary, hook))
    };

    vec![
        with_hook(
            Arc::new(TaskSchedulerBackend::new(
                TaskScope::System,
                runner.clone(),
                templates.clone(),
            )),
            TaskScope::System,
        ),
        with_hook(
            Arc::new(TaskSchedulerBackend::new(
                TaskScope::CurrentUser,
                runner.clone(),
                templates.clone(),
            )),
            TaskScope::CurrentUser,
        ),
        with_hook(
            Arc::new(NssmBackend::new(config.nssm_path.clone(), runner.clone())),
            TaskScope::System,
        ),
    ]
}

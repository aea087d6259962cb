//! systemd backend: a declarative unit file plus `systemctl`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::traits::{ensure_success, RegistryStatus, ServiceBackend};
use crate::error::WardenError;
use crate::executor::CommandRunner;
use crate::model::{RestartPolicy, ServiceSpec};
use crate::templates::{TemplateEngine, SYSTEMD_UNIT_TEMPLATE};

/// Which systemd instance owns the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemdScope {
    /// The system manager (`/etc/systemd/system`, needs root).
    System,
    /// The calling user's manager (`systemctl --user`).
    User,
}

/// Manages a service as a systemd unit with `Restart=` handled by systemd.
pub struct SystemdBackend {
    scope: SystemdScope,
    unit_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
    templates: TemplateEngine,
}

impl SystemdBackend {
    pub fn new(
        scope: SystemdScope,
        unit_dir: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        templates: TemplateEngine,
    ) -> Self {
        Self {
            scope,
            unit_dir: unit_dir.into(),
            runner,
            templates,
        }
    }

    pub fn unit_path(&self, name: &str) -> PathBuf {
        self.unit_dir.join(format!("{}.service", name))
    }

    fn unit_name(name: &str) -> String {
        format!("{}.service", name)
    }

    /// Run `systemctl` in this backend's scope.
    fn systemctl(&self, args: &[&str]) -> Result<crate::executor::SubprocessResult, WardenError> {
        let mut full: Vec<&str> = Vec::with_capacity(args.len() + 1);
        if self.scope == SystemdScope::User {
            full.push("--user");
        }
        full.extend_from_slice(args);
        self.runner.run("systemctl", &full)
    }

    fn systemctl_checked(&self, args: &[&str]) -> Result<(), WardenError> {
        let command = format!("systemctl {}", args.join(" "));
        ensure_success(self.systemctl(args)?, &command).map(|_| ())
    }

    /// Render the unit descriptor for `spec`.
    pub fn render_unit(&self, spec: &ServiceSpec) -> Result<String, WardenError> {
        let context = serde_json::json!({
            "description": spec.description,
            "working_directory": spec.working_directory.to_string_lossy(),
            "exec_start": spec.command_line(),
            "environment": spec.environment,
            "restart": match spec.restart_policy {
                RestartPolicy::Always => "always",
                RestartPolicy::Never => "no",
            },
            "restart_sec": spec.restart_sec,
            "wanted_by": match self.scope {
                SystemdScope::System => "multi-user.target",
                SystemdScope::User => "default.target",
            },
        });
        self.templates.render(SYSTEMD_UNIT_TEMPLATE, &context)
    }

    fn write_unit(&self, path: &Path, content: &str) -> Result<(), WardenError> {
        std::fs::create_dir_all(&self.unit_dir).map_err(|e| {
            WardenError::action_failed(format!(
                "cannot create unit directory '{}': {}",
                self.unit_dir.display(),
                e
            ))
        })?;
        std::fs::write(path, content).map_err(|e| {
            WardenError::action_failed(format!(
                "cannot write unit file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

impl ServiceBackend for SystemdBackend {
    fn name(&self) -> &'static str {
        match self.scope {
            SystemdScope::System => "systemd",
            SystemdScope::User => "systemd-user",
        }
    }

    fn is_available(&self) -> bool {
        self.runner.is_available("systemctl")
    }

    fn query(&self, name: &str) -> Result<RegistryStatus, WardenError> {
        if !self.unit_path(name).exists() {
            return Ok(RegistryStatus::absent());
        }

        // is-active exits non-zero for anything but active, so read stdout.
        let result = self.systemctl(&["is-active", &Self::unit_name(name)])?;
        let state = result.stdout.trim().to_ascii_lowercase();
        debug!(service = %name, state = %state, backend = self.name(), "Queried unit");
        Ok(RegistryStatus::installed(matches!(
            state.as_str(),
            "active" | "activating" | "reloading"
        )))
    }

    fn install(&self, spec: &ServiceSpec) -> Result<(), WardenError> {
        let path = self.unit_path(&spec.name);
        if path.exists() {
            info!(service = %spec.name, backend = self.name(), "Unit exists, recreating");
            self.remove(&spec.name)?;
        }

        let unit = self.render_unit(spec)?;
        self.write_unit(&path, &unit)?;
        self.systemctl_checked(&["daemon-reload"])?;
        self.systemctl_checked(&["enable", &Self::unit_name(&spec.name)])?;

        info!(
            service = %spec.name,
            unit = %path.display(),
            backend = self.name(),
            "Unit installed and enabled"
        );
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), WardenError> {
        let path = self.unit_path(name);
        if !path.exists() {
            debug!(service = %name, backend = self.name(), "No unit to remove");
            return Ok(());
        }

        let unit = Self::unit_name(name);
        for verb in ["stop", "disable"] {
            let result = self.systemctl(&[verb, &unit])?;
            if !result.success {
                warn!(
                    service = %name,
                    stderr = %result.stderr.trim(),
                    "systemctl {} failed during removal", verb
                );
            }
        }

        std::fs::remove_file(&path).map_err(|e| {
            WardenError::action_failed(format!(
                "cannot delete unit file '{}': {}",
                path.display(),
                e
            ))
        })?;
        self.systemctl_checked(&["daemon-reload"])?;

        info!(service = %name, backend = self.name(), "Unit removed");
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), WardenError> {
        self.systemctl_checked(&["start", &Self::unit_name(name)])
    }

    fn stop(&self, name: &str) -> Result<(), WardenError> {
        self.systemctl_checked(&["stop", &Self::unit_name(name)])
    }
}

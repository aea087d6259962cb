//! NSSM backend: wraps a plain executable as a Windows service through the
//! Non-Sucking Service Manager shim.

use std::sync::Arc;

use tracing::{debug, info};

use super::traits::{ensure_success, RegistryStatus, ServiceBackend};
use crate::error::WardenError;
use crate::executor::{CommandRunner, SubprocessResult};
use crate::model::{RestartPolicy, ServiceSpec};

pub struct NssmBackend {
    program: String,
    runner: Arc<dyn CommandRunner>,
}

impl NssmBackend {
    /// `program` is the nssm executable name or path.
    pub fn new(program: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    fn nssm(&self, args: &[&str]) -> Result<SubprocessResult, WardenError> {
        self.runner.run(&self.program, args)
    }

    fn nssm_checked(&self, args: &[&str]) -> Result<(), WardenError> {
        let command = format!("nssm {}", args.join(" "));
        ensure_success(self.nssm(args)?, &command).map(|_| ())
    }

    fn set(&self, name: &str, key: &str, values: &[&str]) -> Result<(), WardenError> {
        let mut args = vec!["set", name, key];
        args.extend_from_slice(values);
        self.nssm_checked(&args)
    }

    fn configure(&self, spec: &ServiceSpec) -> Result<(), WardenError> {
        let name = spec.name.as_str();
        let working_directory = spec.working_directory.to_string_lossy();
        self.set(name, "AppDirectory", &[&working_directory])?;
        self.set(name, "Description", &[&spec.description])?;
        self.set(name, "Start", &["SERVICE_AUTO_START"])?;

        let on_exit = match spec.restart_policy {
            RestartPolicy::Always => "Restart",
            RestartPolicy::Never => "Exit",
        };
        self.set(name, "AppExit", &["Default", on_exit])?;
        let delay_ms = (spec.restart_sec * 1000).to_string();
        self.set(name, "AppRestartDelay", &[&delay_ms])?;

        if !spec.environment.is_empty() {
            let pairs: Vec<String> = spec
                .environment
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            let pairs: Vec<&str> = pairs.iter().map(String::as_str).collect();
            self.set(name, "AppEnvironmentExtra", &pairs)?;
        }
        Ok(())
    }
}

/// nssm prints UTF-16 on some consoles, which shows up as interleaved NULs.
fn clean_output(output: &str) -> String {
    output.replace('\0', "").trim().to_string()
}

impl ServiceBackend for NssmBackend {
    fn name(&self) -> &'static str {
        "nssm"
    }

    fn is_available(&self) -> bool {
        self.runner.is_available(&self.program)
    }

    fn query(&self, name: &str) -> Result<RegistryStatus, WardenError> {
        let result = self.nssm(&["status", name])?;
        if !result.success {
            debug!(service = %name, "nssm knows no such service");
            return Ok(RegistryStatus::absent());
        }
        let status = clean_output(&result.stdout);
        Ok(RegistryStatus::installed(status == "SERVICE_RUNNING"))
    }

    fn install(&self, spec: &ServiceSpec) -> Result<(), WardenError> {
        if self.query(&spec.name)?.exists {
            info!(service = %spec.name, "Service exists, recreating");
            self.remove(&spec.name)?;
        }

        let executable = spec.executable.to_string_lossy();
        let mut args: Vec<&str> = vec!["install", spec.name.as_str(), &*executable];
        args.extend(spec.args.iter().map(String::as_str));
        self.nssm_checked(&args)?;
        self.configure(spec)?;

        info!(service = %spec.name, backend = self.name(), "Service installed");
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), WardenError> {
        let status = self.query(name)?;
        if !status.exists {
            return Ok(());
        }
        if status.active {
            self.nssm_checked(&["stop", name])?;
        }
        self.nssm_checked(&["remove", name, "confirm"])?;
        info!(service = %name, backend = self.name(), "Service removed");
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), WardenError> {
        self.nssm_checked(&["start", name])
    }

    fn stop(&self, name: &str) -> Result<(), WardenError> {
        if !self.query(name)?.active {
            return Ok(());
        }
        self.nssm_checked(&["stop", name])
    }
}

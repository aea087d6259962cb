//! Windows Task Scheduler backend.
//!
//! Registers the service as a scheduled task started at logon (or on a
//! system event), with the task definition rendered as XML so the working
//! directory and restart-on-failure settings can be expressed.

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::traits::{ensure_success, RegistryStatus, ServiceBackend};
use crate::error::WardenError;
use crate::executor::{CommandRunner, SubprocessResult};
use crate::model::{quote_arg, RestartPolicy, ServiceSpec};
use crate::templates::{TemplateEngine, TASK_XML_TEMPLATE};

/// Account the task runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    /// LocalSystem with highest privileges.
    System,
    /// The interactive user who installs the task.
    CurrentUser,
}

/// What fires the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTrigger {
    Logon,
    /// An event log subscription query.
    Event(String),
}

/// Manages a service as a Task Scheduler task.
pub struct TaskSchedulerBackend {
    scope: TaskScope,
    trigger: TaskTrigger,
    name_suffix: &'static str,
    runner: Arc<dyn CommandRunner>,
    templates: TemplateEngine,
}

impl TaskSchedulerBackend {
    /// Logon-triggered task.
    pub fn new(scope: TaskScope, runner: Arc<dyn CommandRunner>, templates: TemplateEngine) -> Self {
        Self {
            scope,
            trigger: TaskTrigger::Logon,
            name_suffix: "",
            runner,
            templates,
        }
    }

    /// Task fired by `trigger`, registered as `<service><name_suffix>`.
    pub fn with_trigger(mut self, trigger: TaskTrigger, name_suffix: &'static str) -> Self {
        self.trigger = trigger;
        self.name_suffix = name_suffix;
        self
    }

    pub fn task_name(&self, name: &str) -> String {
        format!("{}{}", name, self.name_suffix)
    }

    fn schtasks(&self, args: &[&str]) -> Result<SubprocessResult, WardenError> {
        self.runner.run("schtasks", args)
    }

    /// Render the task definition for `spec`.
    pub fn render_task(&self, spec: &ServiceSpec) -> Result<String, WardenError> {
        if !spec.environment.is_empty() {
            warn!(
                service = %spec.name,
                "Task Scheduler tasks cannot carry environment variables; they are ignored"
            );
        }

        let restart_interval = match spec.restart_policy {
            // Task Scheduler rejects restart intervals below one minute.
            RestartPolicy::Always => Some(format!("PT{}M", spec.restart_sec.div_ceil(60).max(1))),
            RestartPolicy::Never => None,
        };
        let event_subscription = match &self.trigger {
            TaskTrigger::Logon => None,
            TaskTrigger::Event(query) => Some(query.as_str()),
        };
        let arguments = spec
            .args
            .iter()
            .map(|a| quote_arg(a))
            .collect::<Vec<_>>()
            .join(" ");

        let context = serde_json::json!({
            "description": spec.description,
            "event_subscription": event_subscription,
            "system": self.scope == TaskScope::System,
            "restart_interval": restart_interval,
            "command": spec.executable.to_string_lossy(),
            "arguments": arguments,
            "working_directory": spec.working_directory.to_string_lossy(),
        });
        self.templates.render(TASK_XML_TEMPLATE, &context)
    }

    /// Register `xml` under `task_name`, replacing any task with that name.
    fn register(&self, task_name: &str, xml: &str) -> Result<(), WardenError> {
        // schtasks expects the UTF-16 encoding the XML declaration names.
        let mut file = tempfile::Builder::new()
            .prefix("warden-task-")
            .suffix(".xml")
            .tempfile()?;
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(xml.encode_utf16().flat_map(|unit| unit.to_le_bytes()));
        file.write_all(&bytes)?;
        file.flush()?;

        let xml_path = file.path().to_string_lossy().into_owned();
        let args = ["/Create", "/TN", task_name, "/XML", xml_path.as_str(), "/F"];
        let command = format!("schtasks {}", args.join(" "));
        ensure_success(self.schtasks(&args)?, &command)?;
        Ok(())
    }
}

/// Read the task state from `schtasks /Query /FO LIST` output.
///
/// Only the value is compared, since the field label is localized.
fn parse_task_running(output: &str) -> bool {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .any(|(_, value)| value.trim().eq_ignore_ascii_case("running"))
}

impl ServiceBackend for TaskSchedulerBackend {
    fn name(&self) -> &'static str {
        match (&self.trigger, self.scope) {
            (TaskTrigger::Event(_), _) => "task-scheduler-event",
            (TaskTrigger::Logon, TaskScope::System) => "task-scheduler",
            (TaskTrigger::Logon, TaskScope::CurrentUser) => "task-scheduler-user",
        }
    }

    fn is_available(&self) -> bool {
        self.runner.is_available("schtasks")
    }

    fn query(&self, name: &str) -> Result<RegistryStatus, WardenError> {
        let task = self.task_name(name);
        let result = self.schtasks(&["/Query", "/TN", &task, "/FO", "LIST"])?;
        if !result.success {
            debug!(task = %task, "Task not registered");
            return Ok(RegistryStatus::absent());
        }
        Ok(RegistryStatus::installed(parse_task_running(&result.stdout)))
    }

    fn install(&self, spec: &ServiceSpec) -> Result<(), WardenError> {
        let task = self.task_name(&spec.name);
        if self.query(&spec.name)?.exists {
            info!(task = %task, backend = self.name(), "Task exists, recreating");
            self.remove(&spec.name)?;
        }

        let xml = self.render_task(spec)?;
        self.register(&task, &xml)?;
        info!(task = %task, backend = self.name(), "Task registered");
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), WardenError> {
        let status = self.query(name)?;
        if !status.exists {
            return Ok(());
        }
        if status.active {
            self.stop(name)?;
        }

        let task = self.task_name(name);
        let args = ["/Delete", "/TN", task.as_str(), "/F"];
        ensure_success(self.schtasks(&args)?, &format!("schtasks {}", args.join(" ")))?;
        info!(task = %task, backend = self.name(), "Task deleted");
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), WardenError> {
        let task = self.task_name(name);
        let args = ["/Run", "/TN", task.as_str()];
        ensure_success(self.schtasks(&args)?, &format!("schtasks {}", args.join(" ")))?;
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<(), WardenError> {
        if !self.query(name)?.active {
            debug!(service = %name, backend = self.name(), "Task not running");
            return Ok(());
        }
        let task = self.task_name(name);
        let args = ["/End", "/TN", task.as_str()];
        ensure_success(self.schtasks(&args)?, &format!("schtasks {}", args.join(" ")))?;
        Ok(())
    }
}

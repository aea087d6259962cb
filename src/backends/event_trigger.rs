//! Wake-from-sleep trigger on Windows.
//!
//! A companion scheduled task that relaunches the service when the machine
//! resumes, registered as `<name>-resume` next to the primary entry.

use std::sync::Arc;

use super::task_scheduler::{TaskScope, TaskSchedulerBackend, TaskTrigger};
use super::traits::{RegistryStatus, ServiceBackend};
use crate::error::WardenError;
use crate::executor::CommandRunner;
use crate::model::{RestartPolicy, ServiceSpec};
use crate::templates::TemplateEngine;

/// Event log subscription matching the power-state transition event.
pub const RESUME_EVENT_QUERY: &str = "<QueryList><Query Id=\"0\" Path=\"System\"><Select Path=\"System\">*[System[(EventID=1074)]]</Select></Query></QueryList>";

const TASK_SUFFIX: &str = "-resume";

pub struct EventTriggerBackend {
    task: TaskSchedulerBackend,
}

impl EventTriggerBackend {
    pub fn new(scope: TaskScope, runner: Arc<dyn CommandRunner>, templates: TemplateEngine) -> Self {
        let task = TaskSchedulerBackend::new(scope, runner, templates)
            .with_trigger(TaskTrigger::Event(RESUME_EVENT_QUERY.to_string()), TASK_SUFFIX);
        Self { task }
    }
}

impl ServiceBackend for EventTriggerBackend {
    fn name(&self) -> &'static str {
        "event-trigger"
    }

    fn is_available(&self) -> bool {
        self.task.is_available()
    }

    fn query(&self, name: &str) -> Result<RegistryStatus, WardenError> {
        self.task.query(name)
    }

    fn install(&self, spec: &ServiceSpec) -> Result<(), WardenError> {
        // The trigger fires once per resume; the primary entry owns restarts.
        let spec = spec
            .clone()
            .with_restart_policy(RestartPolicy::Never)
            .with_description(format!("{} (restart after resume)", spec.description));
        self.task.install(&spec)
    }

    fn remove(&self, name: &str) -> Result<(), WardenError> {
        self.task.remove(name)
    }

    fn start(&self, name: &str) -> Result<(), WardenError> {
        self.task.start(name)
    }

    fn stop(&self, name: &str) -> Result<(), WardenError> {
        self.task.stop(name)
    }
}

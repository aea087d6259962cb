//! Pairs a primary backend with a restart-after-resume hook.

use std::sync::Arc;

use tracing::{info, warn};

use super::traits::{RegistryStatus, ServiceBackend};
use crate::error::WardenError;
use crate::model::ServiceSpec;

/// The hook is installed alongside the primary entry when the service asks
/// for it and removed otherwise. Queries and start/stop only concern the
/// primary entry.
pub struct ResumeHookBackend {
    primary: Arc<dyn ServiceBackend>,
    hook: Arc<dyn ServiceBackend>,
}

impl ResumeHookBackend {
    pub fn new(primary: Arc<dyn ServiceBackend>, hook: Arc<dyn ServiceBackend>) -> Self {
        Self { primary, hook }
    }

    fn remove_hook(&self, name: &str) -> Result<(), WardenError> {
        if !self.hook.is_available() {
            return Ok(());
        }
        self.hook.remove(name)
    }
}

impl ServiceBackend for ResumeHookBackend {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    fn is_available(&self) -> bool {
        self.primary.is_available()
    }

    fn query(&self, name: &str) -> Result<RegistryStatus, WardenError> {
        self.primary.query(name)
    }

    fn install(&self, spec: &ServiceSpec) -> Result<(), WardenError> {
        self.primary.install(spec)?;

        if !spec.restart_after_resume {
            return self.remove_hook(&spec.name);
        }
        if !self.hook.is_available() {
            warn!(
                service = %spec.name,
                hook = self.hook.name(),
                "Restart after resume requested but the hook is unavailable"
            );
            return Ok(());
        }
        self.hook.install(spec)?;
        info!(service = %spec.name, hook = self.hook.name(), "Resume hook installed");
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), WardenError> {
        self.remove_hook(name)?;
        self.primary.remove(name)
    }

    fn start(&self, name: &str) -> Result<(), WardenError> {
        self.primary.start(name)
    }

    fn stop(&self, name: &str) -> Result<(), WardenError> {
        self.primary.stop(name)
    }
}

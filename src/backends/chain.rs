//! Ordered fallback across backends.
//!
//! Installation tries each available backend in order and stops at the
//! first that succeeds. Every other operation goes to whichever backend
//! currently holds the entry.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::traits::{RegistryStatus, ServiceBackend};
use crate::error::{ErrorKind, WardenError};
use crate::model::ServiceSpec;

pub struct FallbackChain {
    backends: Vec<Arc<dyn ServiceBackend>>,
}

impl FallbackChain {
    /// Backends in preference order.
    pub fn new(backends: Vec<Arc<dyn ServiceBackend>>) -> Self {
        Self { backends }
    }

    fn available(&self) -> impl Iterator<Item = &Arc<dyn ServiceBackend>> {
        self.backends.iter().filter(|b| b.is_available())
    }

    fn no_backend(&self) -> WardenError {
        let names: Vec<&str> = self.backends.iter().map(|b| b.name()).collect();
        WardenError::reconcile(
            ErrorKind::BackendUnavailable,
            format!("none of the service backends are usable here (tried: {})", names.join(", ")),
        )
    }

    /// Every available backend holding an entry named `name`, with its status.
    fn holders(
        &self,
        name: &str,
    ) -> Result<Vec<(&Arc<dyn ServiceBackend>, RegistryStatus)>, WardenError> {
        let mut holders = Vec::new();
        let mut queried = 0;
        let mut last_error = None;

        for backend in self.available() {
            match backend.query(name) {
                Ok(status) => {
                    queried += 1;
                    if status.exists {
                        holders.push((backend, status));
                    }
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Registry query failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if queried == 0 => Err(e),
            None if queried == 0 => Err(self.no_backend()),
            _ => Ok(holders),
        }
    }

    /// Name of the backend holding `name`, if any.
    pub fn owner_name(&self, name: &str) -> Result<Option<&'static str>, WardenError> {
        Ok(self.holders(name)?.first().map(|(b, _)| b.name()))
    }
}

impl ServiceBackend for FallbackChain {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn is_available(&self) -> bool {
        self.available().next().is_some()
    }

    fn query(&self, name: &str) -> Result<RegistryStatus, WardenError> {
        Ok(self
            .holders(name)?
            .first()
            .map(|(_, status)| *status)
            .unwrap_or_else(RegistryStatus::absent))
    }

    fn install(&self, spec: &ServiceSpec) -> Result<(), WardenError> {
        // A previous install may have landed on a different backend.
        for (backend, _) in self.holders(&spec.name)? {
            backend.remove(&spec.name)?;
        }

        let mut last_error = None;
        for backend in self.available() {
            match backend.install(spec) {
                Ok(()) => {
                    if last_error.is_some() {
                        info!(backend = backend.name(), "Installed with fallback backend");
                    }
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        error = %e,
                        "Install failed, trying next backend"
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| self.no_backend()))
    }

    fn remove(&self, name: &str) -> Result<(), WardenError> {
        for (backend, _) in self.holders(name)? {
            backend.remove(name)?;
        }
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), WardenError> {
        match self.holders(name)?.first() {
            Some((backend, _)) => backend.start(name),
            None => Err(WardenError::action_failed(format!(
                "no service entry named '{}' to start",
                name
            ))),
        }
    }

    fn stop(&self, name: &str) -> Result<(), WardenError> {
        match self.holders(name)?.first() {
            Some((backend, _)) => backend.stop(name),
            None => {
                debug!(service = %name, "No entry to stop");
                Ok(())
            }
        }
    }
}

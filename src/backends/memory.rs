//! In-process backend for tests and simulations.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::traits::{RegistryStatus, ServiceBackend};
use crate::error::{ErrorKind, WardenError};
use crate::model::ServiceSpec;

#[derive(Debug, Clone)]
struct Entry {
    spec: Option<ServiceSpec>,
    active: bool,
}

/// A registry kept in memory.
///
/// Failures can be injected per operation ("query", "install", "remove",
/// "start", "stop"), and every call is recorded as `"<op> <name>"`.
pub struct InMemoryBackend {
    name: &'static str,
    available: bool,
    inert: bool,
    failing: HashSet<&'static str>,
    entries: Mutex<HashMap<String, Entry>>,
    calls: Mutex<Vec<String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            available: true,
            inert: false,
            failing: HashSet::new(),
            entries: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Pre-register an entry.
    pub fn with_entry(self, name: &str, active: bool) -> Self {
        self.lock_entries()
            .insert(name.to_string(), Entry { spec: None, active });
        self
    }

    /// Make `op` fail with `ActionFailed`.
    pub fn fail_on(mut self, op: &'static str) -> Self {
        self.failing.insert(op);
        self
    }

    /// Report the backend's tooling as missing.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Accept start and stop without changing the entry's state, like a
    /// service manager whose process dies straight away.
    pub fn inert(mut self) -> Self {
        self.inert = true;
        self
    }

    pub fn status(&self, name: &str) -> Option<RegistryStatus> {
        self.lock_entries()
            .get(name)
            .map(|e| RegistryStatus::installed(e.active))
    }

    /// Spec the entry was last installed with.
    pub fn installed_spec(&self, name: &str) -> Option<ServiceSpec> {
        self.lock_entries().get(name).and_then(|e| e.spec.clone())
    }

    /// Flip the running flag, e.g. to simulate a crash.
    pub fn set_active(&self, name: &str, active: bool) {
        if let Some(entry) = self.lock_entries().get_mut(name) {
            entry.active = active;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, op: &'static str, name: &str) -> Result<(), WardenError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(format!("{} {}", op, name));
        if !self.available {
            return Err(WardenError::reconcile(
                ErrorKind::BackendUnavailable,
                format!("{} is not available", self.name),
            ));
        }
        if self.failing.contains(op) {
            return Err(WardenError::action_failed(format!(
                "{} {} failed on {}",
                op, name, self.name
            )));
        }
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn query(&self, name: &str) -> Result<RegistryStatus, WardenError> {
        self.record("query", name)?;
        Ok(self.status(name).unwrap_or_else(RegistryStatus::absent))
    }

    fn install(&self, spec: &ServiceSpec) -> Result<(), WardenError> {
        self.record("install", &spec.name)?;
        self.lock_entries().insert(
            spec.name.clone(),
            Entry {
                spec: Some(spec.clone()),
                active: false,
            },
        );
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), WardenError> {
        self.record("remove", name)?;
        self.lock_entries().remove(name);
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), WardenError> {
        self.record("start", name)?;
        let mut entries = self.lock_entries();
        let entry = entries.get_mut(name).ok_or_else(|| {
            WardenError::action_failed(format!("no entry named '{}'", name))
        })?;
        if !self.inert {
            entry.active = true;
        }
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<(), WardenError> {
        self.record("stop", name)?;
        if !self.inert {
            if let Some(entry) = self.lock_entries().get_mut(name) {
                entry.active = false;
            }
        }
        Ok(())
    }
}

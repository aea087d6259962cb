//! Service backend trait.
//!
//! Defines the interface every platform service manager is driven through.

use crate::error::WardenError;
use crate::executor::{sanitize_output, SubprocessResult};
use crate::model::ServiceSpec;

/// What the service registry says about an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStatus {
    /// A registration with this name exists.
    pub exists: bool,
    /// The service manager reports the entry as running.
    pub active: bool,
}

impl RegistryStatus {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn installed(active: bool) -> Self {
        Self {
            exists: true,
            active,
        }
    }
}

/// A platform mechanism that creates, removes, starts and stops a
/// persistent service registration.
///
/// # Example
///
/// ```ignore
/// let backend = SystemdBackend::new(SystemdScope::System, unit_dir, runner, templates);
/// backend.install(&spec)?;
/// backend.start(&spec.name)?;
/// ```
pub trait ServiceBackend: Send + Sync {
    /// Backend identifier used in logs and reports (e.g., "systemd").
    fn name(&self) -> &'static str;

    /// Whether the tooling this backend drives is present on the host.
    fn is_available(&self) -> bool;

    /// Look the entry up in the registry.
    ///
    /// Returns an error only when the registry itself cannot be queried.
    fn query(&self, name: &str) -> Result<RegistryStatus, WardenError>;

    /// Register the service. An existing entry with the same name is
    /// removed and recreated.
    fn install(&self, spec: &ServiceSpec) -> Result<(), WardenError>;

    /// Delete the registration. Succeeds when there is nothing to remove.
    fn remove(&self, name: &str) -> Result<(), WardenError>;

    fn start(&self, name: &str) -> Result<(), WardenError>;

    fn stop(&self, name: &str) -> Result<(), WardenError>;
}

/// Turn a non-zero exit into an `ActionFailed` error naming the command.
pub(crate) fn ensure_success(
    result: SubprocessResult,
    command: &str,
) -> Result<SubprocessResult, WardenError> {
    if result.success {
        return Ok(result);
    }
    let detail = sanitize_output(&result.combined_output(), 5);
    let code = result
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    Err(WardenError::action_failed(if detail.is_empty() {
        format!("`{}` exited with {}", command, code)
    } else {
        format!("`{}` exited with {}: {}", command, code, detail)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_ensure_success_passes_through() {
        let result = ensure_success(SubprocessResult::ok("fine"), "systemctl start svc").unwrap();
        assert_eq!(result.stdout, "fine");
    }

    #[test]
    fn test_ensure_success_reports_command_and_output() {
        let err = ensure_success(
            SubprocessResult::failed(5, "Unit svc.service not found."),
            "systemctl start svc",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ActionFailed);
        let message = err.to_string();
        assert!(message.contains("systemctl start svc"));
        assert!(message.contains("exited with 5"));
        assert!(message.contains("not found"));
    }
}

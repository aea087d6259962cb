//! Service name validation.
//!
//! The name ends up in unit file paths, task paths and command lines, so
//! only a conservative character set is accepted.

use crate::error::{ValidationErrorKind, WardenError};

const MAX_SERVICE_NAME_LENGTH: usize = 64;

/// Names the service managers reserve or that would shadow system units.
const RESERVED_NAMES: &[&str] = &["systemd", "dbus", "init", "sshd", "schedule", "con", "nul"];

fn invalid(name: &str, message: &str) -> WardenError {
    WardenError::Validation {
        kind: ValidationErrorKind::InvalidServiceName {
            name: name.to_string(),
            message: message.to_string(),
        },
    }
}

/// Validate a service name.
///
/// # Example
///
/// ```
/// use warden::validation::validate_service_name;
///
/// assert!(validate_service_name("gemini-api").is_ok());
/// assert!(validate_service_name("../etc/passwd").is_err());
/// ```
pub fn validate_service_name(name: &str) -> Result<(), WardenError> {
    if name.is_empty() {
        return Err(invalid(name, "cannot be empty"));
    }

    if name.len() > MAX_SERVICE_NAME_LENGTH {
        return Err(invalid(
            name,
            &format!("longer than {} characters", MAX_SERVICE_NAME_LENGTH),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(
            name,
            "only ASCII letters, digits, '-', '_' and '.' are allowed",
        ));
    }

    if name.starts_with('.') || name.starts_with('-') {
        return Err(invalid(name, "cannot start with '.' or '-'"));
    }

    if RESERVED_NAMES.contains(&name.to_ascii_lowercase().as_str()) {
        return Err(invalid(name, "name is reserved"));
    }

    Ok(())
}

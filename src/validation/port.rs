//! Liveness port validation.

use crate::error::{ValidationErrorKind, WardenError};

/// Validate a port number read from configuration or the command line.
pub fn validate_port(port: u32) -> Result<u16, WardenError> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(WardenError::Validation {
            kind: ValidationErrorKind::InvalidPort { port },
        }),
    }
}

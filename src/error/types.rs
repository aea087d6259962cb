//! Error types for warden.

use serde::Serialize;
use thiserror::Error;

/// Main error type for warden.
#[derive(Error, Debug)]
pub enum WardenError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors.
    #[error("Validation error: {kind}")]
    Validation { kind: ValidationErrorKind },

    /// Template-related errors.
    #[error("Template error: {message}")]
    Template { message: String },

    /// Subprocess execution errors.
    #[error("Command error: {kind}")]
    Command { kind: CommandErrorKind },

    /// Reconciliation errors carrying one of the terminal error kinds.
    #[error("{kind}: {message}")]
    Reconcile { kind: ErrorKind, message: String },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Terminal failure kinds a reconciliation can end with.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("administrator privileges required")]
    PrivilegeRequired,

    #[error("service backend unavailable")]
    BackendUnavailable,

    #[error("state probe unavailable")]
    ProbeUnavailable,

    #[error("backend action failed")]
    ActionFailed,

    #[error("state did not converge after verification")]
    VerificationTimeout,

    #[error("cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Stable identifier used in reports and the audit log.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::PrivilegeRequired => "PRIVILEGE_REQUIRED",
            ErrorKind::BackendUnavailable => "BACKEND_UNAVAILABLE",
            ErrorKind::ProbeUnavailable => "PROBE_UNAVAILABLE",
            ErrorKind::ActionFailed => "ACTION_FAILED",
            ErrorKind::VerificationTimeout => "VERIFICATION_TIMEOUT",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }

    /// What the operator should check next.
    pub fn remediation(&self) -> &'static str {
        match self {
            ErrorKind::PrivilegeRequired => {
                if cfg!(windows) {
                    "Re-run from an elevated prompt (Run as administrator)."
                } else {
                    "Re-run as root, e.g. with sudo."
                }
            }
            ErrorKind::BackendUnavailable => {
                if cfg!(windows) {
                    "Check that schtasks.exe is reachable, or install NSSM and put it on PATH."
                } else {
                    "Check that systemd is running and systemctl is on PATH."
                }
            }
            ErrorKind::ProbeUnavailable => {
                "The service registry could not be queried; check the service manager is responsive."
            }
            ErrorKind::ActionFailed => {
                "Check the executable and working directory exist and that the dependencies are installed."
            }
            ErrorKind::VerificationTimeout => {
                "The process did not reach the expected state; check whether the port is occupied by another process and inspect the service logs."
            }
            ErrorKind::Cancelled => {
                "The run was interrupted; re-run the same command to finish reconciling."
            }
        }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Validation error kinds.
#[derive(Error, Debug)]
pub enum ValidationErrorKind {
    #[error("Invalid service name '{name}': {message}")]
    InvalidServiceName { name: String, message: String },

    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u32 },

    #[error("Executable not found: {executable}")]
    ExecutableNotFound { executable: String },

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },
}

/// Command error kinds.
#[derive(Error, Debug)]
pub enum CommandErrorKind {
    #[error("Program not available: {program}")]
    ProgramUnavailable { program: String },

    #[error("Command execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("Command timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

impl WardenError {
    /// Build a reconciliation error of the given kind.
    pub fn reconcile(kind: ErrorKind, message: impl Into<String>) -> Self {
        WardenError::Reconcile {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a failed backend action.
    pub fn action_failed(message: impl Into<String>) -> Self {
        Self::reconcile(ErrorKind::ActionFailed, message)
    }

    /// Map any error onto the terminal kind reported to the operator.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WardenError::Reconcile { kind, .. } => *kind,
            WardenError::Command {
                kind: CommandErrorKind::ProgramUnavailable { .. },
            } => ErrorKind::BackendUnavailable,
            _ => ErrorKind::ActionFailed,
        }
    }
}

/// Result type alias for warden operations.
pub type WardenResult<T> = Result<T, WardenError>;

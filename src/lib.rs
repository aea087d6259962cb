//! warden
//!
//! Reconciles a managed service's desired state (running, stopped, absent)
//! against the host's native service manager: systemd on Linux, Task
//! Scheduler or NSSM on Windows. Every change is verified by probing the
//! host again rather than trusting the service manager's exit codes.

pub mod audit;
pub mod backends;
pub mod config;
pub mod error;
pub mod executor;
pub mod model;
pub mod platform;
pub mod probe;
pub mod reconcile;
pub mod report;
pub mod templates;
pub mod validation;

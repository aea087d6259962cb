//! Audit log of reconciliation runs.
//!
//! Each run is appended as one JSON object per line, with the service spec
//! included after secrets are redacted.

mod entry;
mod logger;
mod sanitize;

pub use entry::{AuditEntry, AuditResult};
pub use logger::AuditLogger;
pub use sanitize::sanitize_params;

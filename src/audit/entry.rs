//! Audit entry types.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::sanitize::sanitize_params;
use crate::model::{Action, ReconciliationResult, ServiceSpec};
use crate::reconcile::Goal;

/// One reconciliation run as recorded in the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// RFC 3339 timestamp of when the run finished.
    pub timestamp: String,
    pub run_id: Uuid,
    /// The command that was run (install, uninstall, start, stop).
    pub command: String,
    pub service: String,
    /// The service spec with secrets redacted.
    pub params: serde_json::Value,
    pub result: AuditResult,
    pub duration_ms: u64,
}

impl AuditEntry {
    pub fn from_result(
        goal: Goal,
        spec: &ServiceSpec,
        result: &ReconciliationResult,
        duration_ms: u64,
    ) -> Self {
        let params = serde_json::to_value(spec)
            .map(|v| sanitize_params(&v))
            .unwrap_or(serde_json::Value::Null);

        let outcome = match result.error {
            None => AuditResult::Success {
                actions: result.actions.clone(),
            },
            Some(kind) => AuditResult::Failure {
                actions: result.actions.clone(),
                error_code: kind.code().to_string(),
                error_message: result.message.clone().unwrap_or_else(|| kind.to_string()),
            },
        };

        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            run_id: result.run_id,
            command: goal.to_string(),
            service: spec.name.clone(),
            params,
            result: outcome,
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum AuditResult {
    #[serde(rename = "success")]
    Success { actions: Vec<Action> },
    #[serde(rename = "failure")]
    Failure {
        /// Actions that completed before the failure.
        actions: Vec<Action>,
        error_code: String,
        error_message: String,
    },
}

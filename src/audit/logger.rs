//! Audit logger writing JSON lines to an append-only file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::WardenError;

use super::entry::AuditEntry;

/// Appends one JSON object per line. Thread-safe via an internal mutex.
pub struct AuditLogger {
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditLogger {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn new(path: &Path) -> Result<Self, WardenError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(path = %parent.display(), "Creating audit log directory");
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        debug!(path = %path.display(), "Audit logger initialized");

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Write `entry` as a single line and sync it to disk.
    pub fn log(&self, entry: &AuditEntry) -> Result<(), WardenError> {
        let json = serde_json::to_string(entry)?;

        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(file, "{}", json)?;

        if let Err(e) = file.sync_data() {
            warn!(error = %e, "Failed to sync audit log");
        }

        debug!(
            run_id = %entry.run_id,
            command = %entry.command,
            "Audit entry logged"
        );

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, ObservedState, ReconciliationResult, ServiceSpec};
    use crate::reconcile::Goal;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn entry(goal: Goal) -> AuditEntry {
        let result = ReconciliationResult {
            run_id: Uuid::nil(),
            service: "svc".to_string(),
            desired: goal.desired(),
            achieved: true,
            actions: vec![Action::Start],
            error: None,
            message: None,
            observed: ObservedState::default(),
        };
        AuditEntry::from_result(goal, &ServiceSpec::new("svc", "/bin/app", "/srv"), &result, 10)
    }

    #[test]
    fn test_logger_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("subdir/audit.log");

        let logger = AuditLogger::new(&log_path).unwrap();
        assert!(log_path.parent().unwrap().exists());
        assert_eq!(logger.path(), log_path);
    }

    #[test]
    fn test_logger_appends_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("audit.log");

        {
            let logger = AuditLogger::new(&log_path).unwrap();
            logger.log(&entry(Goal::Install)).unwrap();
        }
        {
            let logger = AuditLogger::new(&log_path).unwrap();
            logger.log(&entry(Goal::Start)).unwrap();
        }

        let content = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["command"], "install");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["command"], "start");
        assert_eq!(second["result"]["status"], "success");
    }
}

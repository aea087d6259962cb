//! The seam between backends and the operating system.

use std::time::Duration;

use super::subprocess::{Subprocess, SubprocessResult};
use crate::error::WardenError;

/// Runs external programs on behalf of backends and probes.
///
/// Backends never spawn processes directly, so they can be driven by a
/// scripted runner in tests.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, blocking until it exits or times out.
    fn run(&self, program: &str, args: &[&str]) -> Result<SubprocessResult, WardenError>;

    /// Whether `program` can be found on the search path.
    fn is_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Runs commands on the host.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<SubprocessResult, WardenError> {
        Subprocess::new(program)
            .args(args.iter().copied())
            .timeout(self.timeout)
            .run()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn test_scripted_runner_replays_in_order() {
        let runner = ScriptedRunner::new()
            .on("systemctl is-active", SubprocessResult::failed(3, ""))
            .on("systemctl is-active", SubprocessResult::ok("active\n"));

        assert!(!runner.run("systemctl", &["is-active", "svc"]).unwrap().success);
        assert!(runner.run("systemctl", &["is-active", "svc"]).unwrap().success);
        assert!(runner.run("systemctl", &["is-active", "svc"]).unwrap().success);
        assert_eq!(runner.calls().len(), 3);
    }

    #[test]
    fn test_scripted_runner_missing_program() {
        let runner = ScriptedRunner::new().without_program("nssm");
        assert!(!runner.is_available("nssm"));
        assert!(runner.run("nssm", &["status", "svc"]).is_err());
        assert!(runner.calls().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let result = runner.run("echo", &["ok"]).unwrap();
        assert_eq!(result.stdout.trim(), "ok");
        assert!(runner.is_available("sh"));
    }
}

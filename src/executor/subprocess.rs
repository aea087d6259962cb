//! Blocking subprocess execution for the service tooling.
//!
//! Programs are exec'd directly, never through a shell. stdin is closed so
//! a tool that prompts (`nssm remove` without `confirm`, for one) fails
//! instead of hanging until the deadline.

use std::io::{ErrorKind as IoErrorKind, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{CommandErrorKind, WardenError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exit status and captured output of a finished program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubprocessResult {
    pub success: bool,
    /// `None` when the program was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl SubprocessResult {
    fn from_parts(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            success: status.success(),
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(stdout).into_owned(),
            stderr: String::from_utf8_lossy(stderr).into_owned(),
        }
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// stdout and stderr joined; schtasks and nssm report errors on either.
    pub fn combined_output(&self) -> String {
        let out = self.stdout.trim_end();
        let err = self.stderr.trim_end();
        match (out.trim().is_empty(), err.trim().is_empty()) {
            (false, false) => format!("{}\n{}", out, err),
            (false, true) => out.to_string(),
            (true, _) => err.to_string(),
        }
    }
}

/// One program invocation with a deadline.
pub struct Subprocess {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Subprocess {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Spawn the program and wait for it. A program still running at the
    /// deadline is killed and reported as a timeout.
    pub fn run(self) -> Result<SubprocessResult, WardenError> {
        debug!(
            program = %self.program,
            args = ?self.args,
            timeout_ms = self.timeout.as_millis() as u64,
            "Running"
        );

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&self.program, e))?;

        let started = Instant::now();
        let result = self.wait(child, started)?;
        debug!(
            program = %self.program,
            exit_code = ?result.exit_code,
            duration_ms = started.elapsed().as_millis() as u64,
            "Finished"
        );
        Ok(result)
    }

    fn wait(&self, mut child: Child, started: Instant) -> Result<SubprocessResult, WardenError> {
        // Pipes are drained while we poll, or a chatty tool blocks on a full
        // pipe and never exits.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        loop {
            let exited = child.try_wait().map_err(|e| {
                execution_failed(format!("waiting for {} failed: {}", self.program, e))
            })?;
            if let Some(status) = exited {
                // A forked helper can hold the pipes open past our child's exit.
                let deadline = started + self.timeout;
                let stdout = collect(stdout, deadline);
                let stderr = collect(stderr, deadline);
                return Ok(SubprocessResult::from_parts(status, &stdout, &stderr));
            }

            if started.elapsed() > self.timeout {
                warn!(program = %self.program, "Deadline passed, killing");
                if let Err(e) = child.kill() {
                    warn!(program = %self.program, error = %e, "Kill failed");
                }
                let _ = child.wait();
                return Err(WardenError::Command {
                    kind: CommandErrorKind::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    },
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Read a pipe to its end on a helper thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

/// Join a pipe reader, giving up on it at `deadline`.
fn collect(reader: Option<JoinHandle<Vec<u8>>>, deadline: Instant) -> Vec<u8> {
    let Some(handle) = reader else {
        return Vec::new();
    };
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return Vec::new();
        }
        thread::sleep(Duration::from_millis(5));
    }
    handle.join().unwrap_or_default()
}

fn spawn_error(program: &str, e: std::io::Error) -> WardenError {
    let kind = if e.kind() == IoErrorKind::NotFound {
        CommandErrorKind::ProgramUnavailable {
            program: program.to_string(),
        }
    } else {
        CommandErrorKind::ExecutionFailed {
            message: format!("could not start {}: {}", program, e),
        }
    };
    WardenError::Command { kind }
}

fn execution_failed(message: String) -> WardenError {
    WardenError::Command {
        kind: CommandErrorKind::ExecutionFailed { message },
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn run(program: &str, args: &[&str]) -> Result<SubprocessResult, WardenError> {
        Subprocess::new(program)
            .args(args)
            .timeout(Duration::from_secs(5))
            .run()
    }

    #[test]
    fn test_captures_stdout() {
        let result = run("echo", &["hello", "world"]).unwrap();
        assert!(result.success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.trim(), "hello world");
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let result = run("false", &[]).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(1));
    }

    #[test]
    fn test_stdin_is_closed() {
        let result = run("sh", &["-c", "read line || echo eof"]).unwrap();
        assert_eq!(result.stdout.trim(), "eof");
    }

    #[test]
    fn test_missing_program() {
        let err = run("warden_no_such_program", &[]).unwrap_err();
        assert!(matches!(
            err,
            WardenError::Command {
                kind: CommandErrorKind::ProgramUnavailable { .. }
            }
        ));
    }

    #[test]
    fn test_deadline_kills_program() {
        let err = Subprocess::new("sleep")
            .args(["5"])
            .timeout(Duration::from_millis(200))
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            WardenError::Command {
                kind: CommandErrorKind::Timeout { .. }
            }
        ));
    }

    #[test]
    fn test_output_larger_than_a_pipe_buffer() {
        let result = Subprocess::new("sh")
            .args(["-c", "head -c 200000 /dev/zero | tr '\\0' a; echo done >&2"])
            .timeout(Duration::from_secs(5))
            .run()
            .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.len(), 200000);
        assert!(result.stdout.bytes().all(|b| b == b'a'));
        assert_eq!(result.stderr.trim(), "done");
    }

    #[test]
    fn test_background_child_holding_pipe_does_not_hang() {
        let started = Instant::now();
        let result = Subprocess::new("sh")
            .args(["-c", "sleep 3 & echo started"])
            .timeout(Duration::from_millis(500))
            .run()
            .unwrap();
        assert!(result.success);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_combined_output_prefers_both_streams() {
        let result = run("sh", &["-c", "echo out; echo err >&2"]).unwrap();
        assert_eq!(result.combined_output(), "out\nerr");

        let result = run("sh", &["-c", "echo err >&2"]).unwrap();
        assert_eq!(result.combined_output(), "err");
    }
}

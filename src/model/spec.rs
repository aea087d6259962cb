//! Service definitions: what should be managed and in which state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Caller-declared target state for a service entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    Running,
    Stopped,
    Absent,
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesiredState::Running => write!(f, "running"),
            DesiredState::Stopped => write!(f, "stopped"),
            DesiredState::Absent => write!(f, "absent"),
        }
    }
}

/// What the service manager should do when the process exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    Never,
    #[default]
    Always,
}

/// Immutable description of a managed service for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    /// Registry identifier (unit name, task name, service name).
    pub name: String,
    /// Human-readable description written into the registration.
    pub description: String,
    /// Absolute path of the program to run.
    pub executable: PathBuf,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Directory the program runs in.
    pub working_directory: PathBuf,
    /// Environment variables for the managed process.
    pub environment: BTreeMap<String, String>,
    pub restart_policy: RestartPolicy,
    /// Delay before the service manager restarts the process.
    pub restart_sec: u64,
    /// Re-launch the process after the machine resumes from suspend,
    /// where the platform offers a hook for it.
    pub restart_after_resume: bool,
    /// Port used purely for liveness checks.
    pub port: Option<u16>,
}

impl ServiceSpec {
    /// Create a spec with defaults for everything but the identity.
    pub fn new(
        name: impl Into<String>,
        executable: impl Into<PathBuf>,
        working_directory: impl Into<PathBuf>,
    ) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            executable: executable.into(),
            args: Vec::new(),
            working_directory: working_directory.into(),
            environment: BTreeMap::new(),
            restart_policy: RestartPolicy::Always,
            restart_sec: 5,
            restart_after_resume: false,
            port: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_restart_after_resume(mut self, enabled: bool) -> Self {
        self.restart_after_resume = enabled;
        self
    }

    /// Full command line as a single string, each part quoted when needed.
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .map(|part| quote_arg(&part))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Quote a command line argument if it contains whitespace or quotes.
pub fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"') {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('"', "\\\""))
}

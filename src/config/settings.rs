//! Configuration settings for warden.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ValidationErrorKind, WardenError};
use crate::model::{RestartPolicy, ServiceSpec};
use crate::validation::{validate_port, validate_service_name};

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub service: ServiceConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// The managed service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Program to run. A bare name is looked up on the search path.
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Defaults to the directory holding the configuration file.
    pub working_directory: Option<PathBuf>,
    pub description: Option<String>,
    /// Port used for liveness checks.
    pub port: Option<u32>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default = "default_restart_sec")]
    pub restart_sec: u64,
    #[serde(default = "default_restart_after_resume")]
    pub restart_after_resume: bool,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Reconciler timing.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Fixed wait before the single re-probe.
    #[serde(default = "default_verify_delay")]
    pub verify_delay_seconds: u64,
    /// Timeout for each service manager command.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    #[serde(default = "default_port_probe_timeout")]
    pub port_probe_timeout_ms: u64,
}

/// Backend locations.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendsConfig {
    #[serde(default = "default_systemd_unit_dir")]
    pub systemd_unit_dir: PathBuf,
    #[serde(default = "default_systemd_user_unit_dir")]
    pub systemd_user_unit_dir: PathBuf,
    #[serde(default = "default_nssm_path")]
    pub nssm_path: String,
    /// Directory with `*.tera` files overriding the built-in templates.
    pub templates_dir: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
}

fn default_restart_sec() -> u64 {
    5
}

fn default_restart_after_resume() -> bool {
    true
}

fn default_verify_delay() -> u64 {
    3
}

fn default_command_timeout() -> u64 {
    60
}

fn default_port_probe_timeout() -> u64 {
    500
}

fn default_systemd_unit_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_systemd_user_unit_dir() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".config/systemd/user")
}

fn default_nssm_path() -> String {
    "nssm".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("warden-audit.log")
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            verify_delay_seconds: default_verify_delay(),
            command_timeout_seconds: default_command_timeout(),
            port_probe_timeout_ms: default_port_probe_timeout(),
        }
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            systemd_unit_dir: default_systemd_unit_dir(),
            systemd_user_unit_dir: default_systemd_user_unit_dir(),
            nssm_path: default_nssm_path(),
            templates_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: default_audit_log_path(),
        }
    }
}

impl ReconcileConfig {
    pub fn verify_delay(&self) -> Duration {
        Duration::from_secs(self.verify_delay_seconds)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }

    pub fn port_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.port_probe_timeout_ms)
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, WardenError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| WardenError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        let mut settings = Self::parse(&content).map_err(|e| match e {
            WardenError::Config { message } => WardenError::Config {
                message: format!("{} (in '{}')", message, path.display()),
            },
            other => other,
        })?;

        settings.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(settings)
    }

    /// Parse and validate settings from TOML text.
    pub fn parse(content: &str) -> Result<Self, WardenError> {
        let mut settings: Settings = toml::from_str(content).map_err(|e| WardenError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;
        settings.base_dir = PathBuf::from(".");
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), WardenError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(WardenError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(WardenError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        validate_service_name(&self.service.name)?;
        if let Some(port) = self.service.port {
            validate_port(port)?;
        }

        if self.service.executable.trim().is_empty() {
            return Err(WardenError::Validation {
                kind: ValidationErrorKind::InvalidParameter {
                    param: "service.executable".to_string(),
                    message: "cannot be empty".to_string(),
                },
            });
        }

        if self.reconcile.command_timeout_seconds == 0 {
            return Err(WardenError::Config {
                message: "reconcile.command_timeout_seconds must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Apply command line overrides.
    pub fn override_service(
        &mut self,
        name: Option<String>,
        port: Option<u32>,
    ) -> Result<(), WardenError> {
        if let Some(name) = name {
            validate_service_name(&name)?;
            self.service.name = name;
        }
        if let Some(port) = port {
            validate_port(port)?;
            self.service.port = Some(port);
        }
        Ok(())
    }

    /// Build the service spec for installation. The executable must exist,
    /// since it is written into the registration.
    pub fn resolved_service_spec(&self) -> Result<ServiceSpec, WardenError> {
        let executable = resolve_executable(&self.service.executable, &self.base_dir)?;
        self.build_spec(executable)
    }

    /// Build the service spec for commands that only look the service up.
    ///
    /// The executable is resolved when possible and kept as configured
    /// otherwise, so a service whose interpreter is gone can still be
    /// stopped and removed.
    pub fn service_spec(&self) -> Result<ServiceSpec, WardenError> {
        let executable = match resolve_executable(&self.service.executable, &self.base_dir) {
            Ok(path) => path,
            Err(e) => {
                debug!(error = %e, "Using the executable as configured");
                configured_executable(&self.service.executable, &self.base_dir)
            }
        };
        self.build_spec(executable)
    }

    fn build_spec(&self, executable: PathBuf) -> Result<ServiceSpec, WardenError> {
        let service = &self.service;

        let working_directory = match &service.working_directory {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.base_dir.join(dir),
            None => self.base_dir.clone(),
        };
        let working_directory = working_directory
            .canonicalize()
            .unwrap_or(working_directory);

        let port = service.port.map(validate_port).transpose()?;

        let mut spec = ServiceSpec::new(&service.name, executable, working_directory)
            .with_args(service.args.iter().cloned())
            .with_restart_policy(service.restart_policy)
            .with_restart_after_resume(service.restart_after_resume);
        spec.restart_sec = service.restart_sec;
        spec.port = port;
        spec.environment = service.environment.clone();
        if let Some(description) = &service.description {
            spec.description = description.clone();
        }

        Ok(spec)
    }
}

fn configured_executable(executable: &str, base_dir: &Path) -> PathBuf {
    let candidate = Path::new(executable);
    if candidate.components().count() > 1 && !candidate.is_absolute() {
        base_dir.join(candidate)
    } else {
        candidate.to_path_buf()
    }
}

/// Locate the program to run.
///
/// Anything containing a path separator is taken relative to `base_dir`;
/// a bare name is looked up on the search path.
pub fn resolve_executable(executable: &str, base_dir: &Path) -> Result<PathBuf, WardenError> {
    let not_found = || WardenError::Validation {
        kind: ValidationErrorKind::ExecutableNotFound {
            executable: executable.to_string(),
        },
    };

    let candidate = Path::new(executable);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        let path = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            base_dir.join(candidate)
        };
        return if path.is_file() {
            Ok(path.canonicalize().unwrap_or(path))
        } else {
            Err(not_found())
        };
    }

    let resolved = which::which(executable).map_err(|_| not_found())?;
    debug!(executable = %executable, resolved = %resolved.display(), "Resolved executable");
    Ok(resolved)
}

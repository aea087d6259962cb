//! Process table lookups via sysinfo.

use std::path::{Path, PathBuf};

use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System, UpdateKind};
use tracing::{debug, info};

use crate::error::{ErrorKind, WardenError};
use crate::model::ServiceSpec;

/// Finds and kills the managed process.
pub trait ProcessTable: Send + Sync {
    /// PID of a live process running `spec`'s command, if any.
    fn find(&self, spec: &ServiceSpec) -> Result<Option<u32>, WardenError>;

    /// Kill the process with `pid`. Succeeds if it is already gone.
    fn terminate(&self, pid: u32) -> Result<(), WardenError>;
}

/// What the matcher needs to know about a running process.
#[derive(Debug, Clone, Default)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub exe: Option<PathBuf>,
    /// Full argv, including argv[0].
    pub cmd: Vec<String>,
    /// Working directory, when the OS lets us read it.
    pub cwd: Option<PathBuf>,
}

/// Whether `process` runs `spec`'s executable with all of its arguments
/// from `spec`'s working directory.
///
/// An unreadable working directory is not held against the process.
pub fn matches_spec(spec: &ServiceSpec, process: &ProcessInfo) -> bool {
    let wanted = spec.executable.as_path();
    let canonical = wanted.canonicalize().ok();
    let file_name = wanted
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase());

    let same_exe = match &process.exe {
        Some(exe) => exe == wanted || canonical.as_deref() == Some(exe.as_path()),
        None => false,
    };
    let same_name = file_name.as_deref().is_some_and(|f| {
        let name = process.name.to_ascii_lowercase();
        name == f || Path::new(f).file_stem().is_some_and(|s| s.to_string_lossy() == name)
    });
    if !same_exe && !same_name {
        return false;
    }

    let argv = process.cmd.get(1..).unwrap_or_default();
    if !spec.args.iter().all(|arg| argv.iter().any(|a| a == arg)) {
        return false;
    }

    match &process.cwd {
        Some(cwd) => same_dir(&spec.working_directory, cwd),
        None => true,
    }
}

fn same_dir(wanted: &Path, actual: &Path) -> bool {
    if wanted == actual {
        return true;
    }
    match (wanted.canonicalize(), actual.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// The host's process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProcessTable;

impl SysinfoProcessTable {
    fn unsupported() -> WardenError {
        WardenError::reconcile(
            ErrorKind::ProbeUnavailable,
            "process listing is not supported on this platform",
        )
    }

    fn snapshot() -> System {
        System::new_with_specifics(
            RefreshKind::new().with_processes(
                ProcessRefreshKind::new()
                    .with_exe(UpdateKind::OnlyIfNotSet)
                    .with_cmd(UpdateKind::OnlyIfNotSet)
                    .with_cwd(UpdateKind::OnlyIfNotSet),
            ),
        )
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn find(&self, spec: &ServiceSpec) -> Result<Option<u32>, WardenError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(Self::unsupported());
        }
        let own_pid = sysinfo::get_current_pid().ok();
        let system = Self::snapshot();

        let found = system
            .processes()
            .iter()
            .filter(|(pid, _)| Some(**pid) != own_pid)
            .map(|(pid, p)| ProcessInfo {
                pid: pid.as_u32(),
                name: p.name().to_string(),
                exe: p.exe().filter(|e| !e.as_os_str().is_empty()).map(Path::to_path_buf),
                cmd: p.cmd().to_vec(),
                cwd: p.cwd().filter(|c| !c.as_os_str().is_empty()).map(Path::to_path_buf),
            })
            .find(|info| matches_spec(spec, info))
            .map(|info| info.pid);

        debug!(service = %spec.name, pid = ?found, "Scanned process table");
        Ok(found)
    }

    fn terminate(&self, pid: u32) -> Result<(), WardenError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(Self::unsupported());
        }
        let mut system = System::new();
        let pid = Pid::from_u32(pid);
        if !system.refresh_process_specifics(pid, ProcessRefreshKind::new()) {
            return Ok(());
        }
        match system.process(pid) {
            Some(process) if !process.kill() => Err(WardenError::action_failed(format!(
                "could not kill process {}",
                pid
            ))),
            Some(_) => {
                info!(pid = %pid, "Process killed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

//! Administrator privilege detection.

use std::sync::Arc;

use crate::executor::CommandRunner;

pub trait PrivilegeCheck: Send + Sync {
    /// Whether the current process may create system-wide registrations.
    fn is_elevated(&self) -> bool;
}

/// Asks the host.
pub struct HostPrivileges {
    #[cfg_attr(unix, allow(dead_code))]
    runner: Arc<dyn CommandRunner>,
}

impl HostPrivileges {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl PrivilegeCheck for HostPrivileges {
    #[cfg(unix)]
    fn is_elevated(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    /// `net session` only succeeds from an elevated token.
    #[cfg(not(unix))]
    fn is_elevated(&self) -> bool {
        self.runner
            .run("net", &["session"])
            .map(|result| result.success)
            .unwrap_or(false)
    }
}

/// Fixed answer, for tests and dry runs.
#[derive(Debug, Clone, Copy)]
pub struct StaticPrivileges(pub bool);

impl PrivilegeCheck for StaticPrivileges {
    fn is_elevated(&self) -> bool {
        self.0
    }
}

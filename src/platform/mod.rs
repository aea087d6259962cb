//! Host facilities outside the service registry.

mod cancel;
mod privilege;

pub use cancel::CancelToken;
pub use privilege::{HostPrivileges, PrivilegeCheck, StaticPrivileges};

//! Service backends.
//!
//! Each backend drives one platform service manager. The reconciler only
//! sees the [`ServiceBackend`] trait; [`detect_backend`] picks the concrete
//! chain at startup.

mod chain;
mod detect;
mod event_trigger;
mod memory;
mod nssm;
mod resume;
mod systemd;
mod task_scheduler;
mod traits;

pub use chain::FallbackChain;
pub use detect::{detect_backend, Platform};
pub use event_trigger::{EventTriggerBackend, RESUME_EVENT_QUERY};
pub use memory::InMemoryBackend;
pub use nssm::NssmBackend;
pub use resume::ResumeHookBackend;
pub use systemd::{SystemdBackend, SystemdScope};
pub use task_scheduler::{TaskScope, TaskSchedulerBackend, TaskTrigger};
pub use traits::{RegistryStatus, ServiceBackend};

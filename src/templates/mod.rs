//! Templates for service registrations.

mod engine;

pub use engine::{TemplateEngine, SYSTEMD_UNIT_TEMPLATE, TASK_XML_TEMPLATE};

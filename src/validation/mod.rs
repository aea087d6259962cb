//! Input validation module.
//!
//! Provides validators for service names and liveness ports.

mod port;
mod service_name;

pub use port::validate_port;
pub use service_name::validate_service_name;

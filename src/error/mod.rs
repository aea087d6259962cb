//! Error types for warden.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;

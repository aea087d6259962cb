//! Command executor module.
//!
//! Handles subprocess spawning, execution timeouts and output trimming.

mod output;
mod runner;
mod subprocess;

pub use output::sanitize_output;
pub use runner::{CommandRunner, SystemRunner};
pub use subprocess::{Subprocess, SubprocessResult};

#[cfg(test)]
pub(crate) use runner::testing;

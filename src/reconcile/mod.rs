//! Reconciliation of desired against observed service state.

mod machine;
mod plan;

pub use machine::{Reconciler, DEFAULT_VERIFY_DELAY};
pub use plan::{plan, Goal, Plan};

//! Data model shared by probes, backends and the reconciler.

mod spec;
mod state;

pub use spec::{quote_arg, DesiredState, RestartPolicy, ServiceSpec};
pub use state::{
    Action, ActionTaken, ObservedState, ProbeOutcome, ProbeSignal, ReconciliationResult,
};

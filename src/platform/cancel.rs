//! Cooperative cancellation for Ctrl-C.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::error::WardenError;

/// Shared flag checked by the reconciler between actions.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Cancel this token on Ctrl-C. Can only be installed once per process.
    pub fn install_ctrlc_handler(&self) -> Result<(), WardenError> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            warn!("Interrupt received, stopping after the current action");
            token.cancel();
        })
        .map_err(|e| WardenError::Config {
            message: format!("Failed to install interrupt handler: {}", e),
        })
    }
}

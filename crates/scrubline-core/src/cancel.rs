//! Cooperative cancellation, honored at row boundaries.
//!
//! The token is created once per run and threaded explicitly into the
//! pipeline rather than living in a process-wide global. The CLI wires
//! SIGINT/SIGTERM to it; tests flip it directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag for one run.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Underlying flag, for signal-handler registration.
    pub fn flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }
}

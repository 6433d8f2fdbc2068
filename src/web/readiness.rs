//! Server readiness state

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether the server should receive traffic.
///
/// Starts not ready, becomes ready once the listener is bound, and goes back
/// to not ready when shutdown begins, before open connections drain.
#[derive(Debug, Clone, Default)]
pub struct Readiness {
    ready: Arc<AtomicBool>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn mark_not_ready(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

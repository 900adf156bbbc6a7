//! Progress reporting seam shared by transport and archive adapters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Receives byte-level progress from an adapter and tells it when to stop.
///
/// Adapters call this from whatever thread they run on, so implementations
/// must be cheap and non-blocking.
pub trait ProgressSink: Send + Sync {
    /// Whether the owning operation has been cancelled.
    fn is_cancelled(&self) -> bool;

    /// Expected total bytes of the current phase.
    fn set_total(&self, total: u64);

    /// Bytes processed since the last call.
    fn add_progress(&self, bytes: u64);
}

/// Sink that records totals and never cancels.
#[derive(Debug, Default)]
pub struct CountingProgress {
    total: AtomicU64,
    current: AtomicU64,
    cancelled: AtomicBool,
}

impl CountingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Make subsequent `is_cancelled` calls return `true`.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl ProgressSink for CountingProgress {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    fn add_progress(&self, bytes: u64) {
        self.current.fetch_add(bytes, Ordering::Relaxed);
    }
}

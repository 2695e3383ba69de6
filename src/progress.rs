//! Progress reporting and cancellation hooks for long precalculations.

use std::sync::atomic::{AtomicBool, Ordering};

/// Receives whole-number percentages as precalculation advances.
///
/// Updates are fire-and-forget: parallel workers may deliver them out of
/// order, and implementations must not block the caller.
pub trait ProgressSink: Sync {
    fn percent(&self, value: u8);
}

/// Discards every update.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn percent(&self, _value: u8) {}
}

/// A progress bar of length 100 maps percentages straight onto positions.
impl ProgressSink for indicatif::ProgressBar {
    fn percent(&self, value: u8) {
        self.set_position(value as u64);
    }
}

/// Cooperative cancellation flag, checked between matrix builds.
#[derive(Debug, Default)]
pub struct CancelToken(AtomicBool);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

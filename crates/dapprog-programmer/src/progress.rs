//! Job progress reporting

use std::sync::atomic::{AtomicU8, Ordering};

/// Percentage of the current job, shared between the worker and readers
///
/// While a job writes, the value never exceeds 99. Only `complete`
/// reports 100, which the worker calls once the flash session has been
/// closed successfully.
#[derive(Debug, Default)]
pub struct Progress {
    percent: AtomicU8,
}

impl Progress {
    /// Create a tracker at 0%
    pub const fn new() -> Self {
        Self {
            percent: AtomicU8::new(0),
        }
    }

    /// Current percentage
    pub fn get(&self) -> u8 {
        self.percent.load(Ordering::Acquire)
    }

    /// Start a new job
    pub fn reset(&self) {
        self.percent.store(0, Ordering::Release);
    }

    /// Record `written` of `total` bytes
    pub fn update(&self, written: usize, total: usize) {
        let percent = if total == 0 {
            0
        } else {
            (written as u64 * 100 / total as u64).min(99) as u8
        };
        self.percent.store(percent, Ordering::Release);
    }

    /// Mark the job as finished
    pub fn complete(&self) {
        self.percent.store(100, Ordering::Release);
    }
}

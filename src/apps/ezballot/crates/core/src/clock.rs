//! Time source for vote and registration timestamps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Unix timestamp in milliseconds.
    fn now_millis(&self) -> u64;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// Deterministic clock for tests: starts at a fixed instant and advances
/// by one millisecond on every read.
#[derive(Debug, Default)]
pub struct StepClock {
    next: AtomicU64,
}

impl StepClock {
    pub fn starting_at(millis: u64) -> Self {
        Self {
            next: AtomicU64::new(millis),
        }
    }
}

impl Clock for StepClock {
    fn now_millis(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

//! Logical clock for ordering write intents.

use std::sync::atomic::{AtomicU64, Ordering};

/// Issues a strictly increasing version number for each new write intent.
///
/// Submission order, not network completion order, is what the rest of the
/// engine reasons about. The counter is monotonic for the life of the
/// process; it survives the fatal reset.
#[derive(Debug, Default)]
pub struct LogicalClock {
    counter: AtomicU64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Issue the next version number, starting at 1.
    pub fn next_version(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

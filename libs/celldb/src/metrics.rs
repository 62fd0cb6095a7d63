//! Injectable construction counters.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// A counted event.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum Counter {
    /// A revision was derived.
    RevisionDerived,
    /// A backup was created.
    BackupCreated,
    /// A tree was created.
    TreeCreated,
    /// A tree was reused by identity during snapshot assembly.
    TreeReused,
    /// A block of the block index was rebuilt.
    BlockRebuilt,
    /// A block of the block index was shared with the previous revision.
    BlockReused,
    /// A port equivalence was computed.
    EquivComputed,
    /// A port equivalence was carried forward from a previous tree.
    EquivReused,
}

impl Counter {
    const COUNT: usize = 8;

    fn index(self) -> usize {
        self as usize
    }
}

/// Receives counter increments.
pub trait Metrics: Debug + Send + Sync {
    /// Adds `n` to a counter.
    fn incr(&self, counter: Counter, n: u64);
}

/// Discards all counts.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoMetrics;

impl Metrics for NoMetrics {
    #[inline]
    fn incr(&self, _counter: Counter, _n: u64) {}
}

/// Keeps every counter in an atomic.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    counts: [AtomicU64; Counter::COUNT],
}

impl CounterMetrics {
    /// Creates a collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current value of a counter.
    pub fn get(&self, counter: Counter) -> u64 {
        self.counts[counter.index()].load(Ordering::Relaxed)
    }
}

impl Metrics for CounterMetrics {
    fn incr(&self, counter: Counter, n: u64) {
        self.counts[counter.index()].fetch_add(n, Ordering::Relaxed);
    }
}

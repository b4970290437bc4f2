//! Pipeline statistics
//!
//! Thread-safe counters shared by producers and the consumer task.
//! Uses lock-free atomics for all operations.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters of one pipeline (fully lock-free)
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Entries accepted by the queue
    enqueued: AtomicU64,
    /// Entries rejected because the queue was full or closed
    dropped: AtomicU64,
    /// Entries handed to a writer
    processed: AtomicU64,
    /// Entries whose formatting or writing failed
    failed: AtomicU64,
    /// Entries skipped by a target's minimum level
    filtered: AtomicU64,
    /// Entries with no resolvable target
    unrouted: AtomicU64,
    /// Entries processed on the shutdown drain path
    drained: AtomicU64,
    /// Batches processed by the consumer loop
    batches: AtomicU64,
    /// Entries rendered with the fallback template
    fallbacks: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub processed: u64,
    pub failed: u64,
    pub filtered: u64,
    pub unrouted: u64,
    pub drained: u64,
    pub batches: u64,
    pub fallbacks: u64,
}

macro_rules! counter {
    ($add:ident, $field:ident) => {
        #[inline]
        pub fn $add(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(add_enqueued, enqueued);
    counter!(add_dropped, dropped);
    counter!(add_processed, processed);
    counter!(add_failed, failed);
    counter!(add_filtered, filtered);
    counter!(add_unrouted, unrouted);
    counter!(add_drained, drained);
    counter!(add_batch, batches);
    counter!(add_fallback, fallbacks);

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}

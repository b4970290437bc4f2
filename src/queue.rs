//! Bounded background queue
//!
//! Interception must never stall the calling thread, so enqueueing is a
//! non-blocking `try_send`: when the queue is full the entry is dropped
//! and counted, never retried.
//!
//! `BackgroundQueue` is the cloneable producer side; `QueueReader` is the
//! single consumer side owned by the background service.

use crate::entry::LogEntry;
use crate::stats::PipelineStats;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// Producer handle (cheap to clone, safe from any thread)
#[derive(Debug, Clone)]
pub struct BackgroundQueue {
    tx: mpsc::Sender<LogEntry>,
    stats: Arc<PipelineStats>,
}

/// Consumer side; exactly one exists per queue
#[derive(Debug)]
pub struct QueueReader {
    rx: mpsc::Receiver<LogEntry>,
}

/// Create a queue holding at most `capacity` entries
pub fn channel(capacity: usize, stats: Arc<PipelineStats>) -> (BackgroundQueue, QueueReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (BackgroundQueue { tx, stats }, QueueReader { rx })
}

impl BackgroundQueue {
    /// Enqueue without blocking. Returns `false` (and drops the entry) when
    /// the queue is full or the consumer has stopped.
    pub fn try_enqueue(&self, entry: LogEntry) -> bool {
        match self.tx.try_send(entry) {
            Ok(()) => {
                self.stats.add_enqueued();
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                self.stats.add_dropped();
                false
            }
        }
    }

    /// Entries currently buffered
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Whether the consumer side is gone or closed
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl QueueReader {
    /// Wait for the next entry; `None` once every producer is gone and the
    /// buffer is empty. Cancel-safe.
    pub async fn recv(&mut self) -> Option<LogEntry> {
        self.rx.recv().await
    }

    /// Take a buffered entry without waiting
    pub fn try_dequeue(&mut self) -> Option<LogEntry> {
        match self.rx.try_recv() {
            Ok(entry) => Some(entry),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Refuse new entries while keeping buffered ones readable
    pub fn close(&mut self) {
        self.rx.close();
    }
}

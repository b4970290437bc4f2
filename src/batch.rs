//! Size/time batch collector
//!
//! Owned and mutated by the single consumer task only, so no locking.
//! Deadlines use `tokio::time::Instant` so tests can drive them with a
//! paused clock.

use std::time::Duration;
use tokio::time::Instant;

/// Accumulates items until `max_batch_size` is reached or `batch_timeout`
/// has elapsed since the first buffered item.
#[derive(Debug)]
pub struct BatchCollector<T> {
    items: Vec<T>,
    max_batch_size: usize,
    batch_timeout: Duration,
    /// Set when the first item of a window arrives
    deadline: Option<Instant>,
}

impl<T> BatchCollector<T> {
    pub fn new(max_batch_size: usize, batch_timeout: Duration) -> Self {
        let max_batch_size = max_batch_size.max(1);
        Self {
            items: Vec::with_capacity(max_batch_size),
            max_batch_size,
            batch_timeout,
            deadline: None,
        }
    }

    /// Buffer an item.
    ///
    /// Returns `(added, batch)`: `batch` is the full buffer when this item
    /// reached the size threshold or arrived after the window expired.
    pub fn try_add(&mut self, item: T) -> (bool, Option<Vec<T>>) {
        let now = Instant::now();
        if self.items.is_empty() {
            self.deadline = Some(now + self.batch_timeout);
        }
        self.items.push(item);

        if self.items.len() >= self.max_batch_size || self.is_expired_at(now) {
            return (true, Some(self.flush()));
        }
        (true, None)
    }

    /// Take whatever is buffered (possibly nothing) and reset the window
    pub fn flush(&mut self) -> Vec<T> {
        self.deadline = None;
        std::mem::replace(&mut self.items, Vec::with_capacity(self.max_batch_size))
    }

    /// Flush only if the window has expired
    pub fn take_expired(&mut self) -> Option<Vec<T>> {
        if self.is_expired_at(Instant::now()) {
            Some(self.flush())
        } else {
            None
        }
    }

    /// When the current window closes; `None` while empty
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_flushes_at_size_threshold() {
        let mut collector = BatchCollector::new(3, Duration::from_secs(10));

        assert_eq!(collector.try_add(1), (true, None));
        assert_eq!(collector.try_add(2), (true, None));
        let (added, batch) = collector.try_add(3);

        assert!(added);
        assert_eq!(batch, Some(vec![1, 2, 3]));
        assert!(collector.is_empty());
        assert!(collector.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_observable_without_new_items() {
        let mut collector = BatchCollector::new(5, Duration::from_millis(200));
        collector.try_add("a");
        collector.try_add("b");

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(collector.take_expired(), None);

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(collector.take_expired(), Some(vec!["a", "b"]));
        assert!(collector.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_item_closes_expired_window() {
        let mut collector = BatchCollector::new(5, Duration::from_millis(100));
        collector.try_add(1);
        tokio::time::advance(Duration::from_millis(120)).await;

        assert_eq!(collector.try_add(2), (true, Some(vec![1, 2])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_starts_at_first_item_and_resets() {
        let mut collector = BatchCollector::new(2, Duration::from_millis(100));
        assert!(collector.deadline().is_none());

        let start = Instant::now();
        collector.try_add(1);
        assert_eq!(collector.deadline(), Some(start + Duration::from_millis(100)));

        tokio::time::advance(Duration::from_millis(40)).await;
        collector.try_add(2);
        assert!(collector.deadline().is_none());

        collector.try_add(3);
        assert_eq!(
            collector.deadline(),
            Some(start + Duration::from_millis(140))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_partial_and_empty() {
        let mut collector = BatchCollector::new(10, Duration::from_secs(1));
        assert!(collector.flush().is_empty());

        collector.try_add(7);
        assert_eq!(collector.flush(), vec![7]);
        assert_eq!(collector.len(), 0);
    }
}

//! Bounded history of segment-wide messages.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Default number of retained messages per log.
pub const DEFAULT_MESSAGE_LOG_CAPACITY: usize = 1000;

/// Append-only ring buffer that evicts the oldest entry when full.
#[derive(Debug)]
pub struct MessageLog<T> {
    capacity: usize,
    entries: Mutex<VecDeque<T>>,
}

impl<T: Clone> MessageLog<T> {
    /// Create a log holding at most `capacity` entries.
    ///
    /// A capacity of zero retains nothing.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(
                capacity.min(DEFAULT_MESSAGE_LOG_CAPACITY),
            )),
        }
    }

    /// Append an entry, returning the evicted one if the log was full.
    pub fn push(&self, entry: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(entry);
        }
        let mut entries = self.entries.lock();
        let evicted = if entries.len() >= self.capacity {
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(entry);
        evicted
    }

    /// Copy of the retained entries, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Maximum number of retained entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> Default for MessageLog<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_entries_in_arrival_order() {
        let log = MessageLog::new(3);
        assert!(log.is_empty());
        log.push(1);
        log.push(2);
        assert_eq!(log.snapshot(), vec![1, 2]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let log = MessageLog::new(2);
        assert_eq!(log.push("a"), None);
        assert_eq!(log.push("b"), None);
        assert_eq!(log.push("c"), Some("a"));
        assert_eq!(log.snapshot(), vec!["b", "c"]);
        assert_eq!(log.capacity(), 2);
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let log = MessageLog::new(0);
        assert_eq!(log.push(7), Some(7));
        assert!(log.is_empty());
    }

    #[test]
    fn default_capacity() {
        let log: MessageLog<u8> = MessageLog::default();
        assert_eq!(log.capacity(), DEFAULT_MESSAGE_LOG_CAPACITY);
    }
}

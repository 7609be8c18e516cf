//! Fixed-capacity history buffer with explicit eviction.
//!
//! Both the metric-sample history and the completed-session history are
//! bounded: once capacity is reached the oldest entry is evicted. Eviction is
//! an explicit, observable operation rather than a side effect buried in the
//! caller.

use std::collections::VecDeque;

/// A bounded ring buffer preserving insertion order (most-recent-last).
#[derive(Debug)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// Create a history holding at most `capacity` entries.
    ///
    /// A zero capacity is clamped to 1 so a push always retains something.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, returning the evicted oldest entry if full.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Most recently pushed entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// The `n` most recent entries, oldest-first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }
}

impl<T: Clone> BoundedHistory<T> {
    /// Snapshot the current contents, oldest-first.
    ///
    /// Rule evaluation operates on snapshots so the lock guarding the live
    /// buffer is never held across analysis.
    pub fn snapshot(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

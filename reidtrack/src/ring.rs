//! Fixed-capacity history buffer
//!
//! Once full, every push evicts the oldest entry. Used for per-track
//! appearance descriptors and trajectories.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct HistoryRing<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryRing<T> {
    /// Create an empty ring. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `item`, returning the evicted oldest entry when the ring was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Entries from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// Entries from newest to oldest
    pub fn recent(&self) -> impl Iterator<Item = &T> {
        self.items.iter().rev()
    }
}

impl<T: Clone> HistoryRing<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_order() {
        let mut ring = HistoryRing::new(5);
        for word in ["alpha", "bravo", "charlie", "delta", "echo"] {
            assert_eq!(ring.push(word), None);
        }
        assert!(ring.is_full());

        assert_eq!(ring.push("foxtrot"), Some("alpha"));
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.oldest(), Some(&"bravo"));
        assert_eq!(ring.newest(), Some(&"foxtrot"));
        assert_eq!(
            ring.to_vec(),
            vec!["bravo", "charlie", "delta", "echo", "foxtrot"]
        );
        assert_eq!(ring.recent().next(), Some(&"foxtrot"));
    }

    #[test]
    fn test_partial_ring() {
        let mut ring = HistoryRing::new(3);
        assert!(ring.is_empty());
        assert_eq!(ring.newest(), None);

        ring.push(1);
        ring.push(2);
        assert!(!ring.is_full());
        assert_eq!(ring.oldest(), Some(&1));
        assert_eq!(ring.recent().copied().collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_zero_capacity_holds_latest() {
        let mut ring = HistoryRing::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push('a');
        assert_eq!(ring.push('b'), Some('a'));
        assert_eq!(ring.newest(), Some(&'b'));
    }
}

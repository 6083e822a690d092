// Save-state storage: the Quetzal container and the in-memory undo history

pub mod quetzal;

use std::collections::VecDeque;

/// Bounded history of serialized undo snapshots
#[derive(Debug)]
pub struct SnapshotHistory {
    snapshots: VecDeque<Vec<u8>>,
    max_memory: usize,
    current_memory: usize,
}

impl SnapshotHistory {
    pub fn new(max_memory: usize) -> Self {
        SnapshotHistory {
            snapshots: VecDeque::new(),
            max_memory,
            current_memory: 0,
        }
    }

    /// Add a snapshot, evicting the oldest ones until it fits.
    /// Returns `false` if the snapshot alone exceeds the limit.
    pub fn push(&mut self, snapshot: Vec<u8>) -> bool {
        if snapshot.len() > self.max_memory {
            return false;
        }
        while self.current_memory + snapshot.len() > self.max_memory {
            match self.snapshots.pop_front() {
                Some(old) => self.current_memory -= old.len(),
                None => break,
            }
        }
        self.current_memory += snapshot.len();
        self.snapshots.push_back(snapshot);
        true
    }

    /// Take the most recent snapshot
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        let snapshot = self.snapshots.pop_back()?;
        self.current_memory -= snapshot.len();
        Some(snapshot)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Bytes held by all snapshots
    pub fn memory_usage(&self) -> usize {
        self.current_memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_over_limit() {
        let mut history = SnapshotHistory::new(10);
        assert!(history.push(vec![1; 4]));
        assert!(history.push(vec![2; 4]));
        assert!(history.push(vec![3; 4]));
        assert_eq!(history.len(), 2);
        assert_eq!(history.memory_usage(), 8);
        assert_eq!(history.pop(), Some(vec![3; 4]));
        assert_eq!(history.pop(), Some(vec![2; 4]));
        assert!(history.pop().is_none());
    }

    #[test]
    fn test_rejects_oversized_snapshot() {
        let mut history = SnapshotHistory::new(4);
        assert!(!history.push(vec![0; 5]));
        assert!(history.is_empty());
    }
}

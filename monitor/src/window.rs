//! Bounded window of recent snapshots shared by forecasting and retraining

use std::collections::VecDeque;

use crate::model::Snapshot;

const INITIAL_ALLOCATION: usize = 1024;

/// Fixed-capacity FIFO of snapshots, oldest first
#[derive(Debug, Clone)]
pub struct SnapshotWindow {
    capacity: usize,
    snapshots: VecDeque<Snapshot>,
}

impl SnapshotWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            snapshots: VecDeque::with_capacity(capacity.min(INITIAL_ALLOCATION)),
        }
    }

    /// Append a snapshot, evicting the oldest when full
    pub fn push(&mut self, snapshot: Snapshot) {
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    /// Owned copy for handing to a predictor outside any lock
    pub fn to_vec(&self) -> Vec<Snapshot> {
        self.snapshots.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

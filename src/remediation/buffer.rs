//! Fixed-capacity FIFO of recent monitoring snapshots.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{MetricsSnapshot, Prediction};

/// One monitoring cycle as seen by the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Metrics the engine evaluated (before prediction merge)
    pub metrics: MetricsSnapshot,
    /// Prediction passed to the engine, if any survived the confidence filter
    pub prediction: Option<Prediction>,
    /// When the cycle completed
    pub timestamp: DateTime<Utc>,
    /// Metrics came from the fallback path
    pub degraded: bool,
    /// Number of action results the cycle produced
    pub actions_triggered: usize,
}

/// Ring buffer that evicts its oldest entry on overflow.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    entries: VecDeque<SnapshotRecord>,
    capacity: usize,
}

impl SnapshotBuffer {
    /// Create a buffer holding at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest if full. Returns the evicted
    /// record.
    pub fn push(&mut self, record: SnapshotRecord) -> Option<SnapshotRecord> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(record);
        evicted
    }

    /// Change the capacity, dropping oldest entries that no longer fit.
    /// Returns how many were dropped.
    pub fn resize(&mut self, capacity: usize) -> usize {
        self.capacity = capacity.max(1);
        let excess = self.entries.len().saturating_sub(self.capacity);
        self.entries.drain(..excess);
        excess
    }

    /// The most recent `limit` records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<SnapshotRecord> {
        let start = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(start).cloned().collect()
    }

    /// Most recent record.
    pub fn latest(&self) -> Option<&SnapshotRecord> {
        self.entries.back()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of records held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//! Aggregates per-part transfer progress into one snapshot for the caller.

use crate::models::progress::ProgressSnapshot;
use std::collections::{HashMap, HashSet};

/// Running byte count across the parts of one upload.
///
/// In-flight parts are cached by part number with their last reported
/// cumulative byte count. When a part finishes its full length is folded into
/// `completed_bytes` and the cache entry is dropped, so it is never counted
/// twice.
#[derive(Debug)]
pub struct ProgressAggregator {
    total_bytes: u64,
    completed_bytes: u64,
    in_flight: HashMap<u32, u64>,
    finished: HashSet<u32>,
}

impl ProgressAggregator {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            completed_bytes: 0,
            in_flight: HashMap::new(),
            finished: HashSet::new(),
        }
    }

    /// Records the cumulative bytes sent for an in-flight part.
    ///
    /// Returns `None` for reports that arrive after the part finished.
    pub fn record(&mut self, part_number: u32, loaded: u64) -> Option<ProgressSnapshot> {
        if self.finished.contains(&part_number) {
            return None;
        }
        let entry = self.in_flight.entry(part_number).or_insert(0);
        *entry = (*entry).max(loaded);
        Some(self.snapshot())
    }

    /// Folds a finished part of `part_len` bytes into the running total.
    pub fn complete(&mut self, part_number: u32, part_len: u64) -> ProgressSnapshot {
        if self.finished.insert(part_number) {
            let cached = self.in_flight.remove(&part_number).unwrap_or(0);
            self.completed_bytes += cached.max(part_len);
        }
        self.snapshot()
    }

    /// Drops the contribution of a failed part; the percentage may go down.
    pub fn evict(&mut self, part_number: u32) -> ProgressSnapshot {
        self.in_flight.remove(&part_number);
        self.snapshot()
    }

    pub fn sent_bytes(&self) -> u64 {
        self.completed_bytes + self.in_flight.values().sum::<u64>()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot::new(self.sent_bytes(), self.total_bytes)
    }
}

//! Part scheduling for one upload: the pending queue, the active table and the
//! receipts of finished parts.
//!
//! The scheduler does no I/O. The uploader asks it which part to send next,
//! tells it how each transfer ended, and takes the sorted receipts once
//! everything has drained.

use crate::models::session::{Part, UploadedPart};
use std::collections::{BTreeMap, VecDeque};

/// Hard ceiling on simultaneous part transfers.
pub const MAX_THREADS: usize = 15;

/// Default number of simultaneous part transfers.
pub const DEFAULT_THREADS: usize = 5;

/// Which end of the pending queue the next part is taken from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DispatchOrder {
    /// Highest part number first.
    #[default]
    Lifo,
    /// Lowest part number first.
    Fifo,
}

/// `requested` clamped to `1..=MAX_THREADS`.
pub fn effective_threads(requested: usize) -> usize {
    requested.clamp(1, MAX_THREADS)
}

#[derive(Debug)]
pub struct PartScheduler {
    pending: VecDeque<Part>,
    active: BTreeMap<u32, Part>,
    uploaded: Vec<UploadedPart>,
    threads: usize,
    order: DispatchOrder,
    drained: bool,
}

impl PartScheduler {
    /// `parts` must be in ascending part-number order.
    pub fn new(parts: Vec<Part>, threads_quantity: usize, order: DispatchOrder) -> Self {
        Self {
            pending: parts.into(),
            active: BTreeMap::new(),
            uploaded: Vec::new(),
            threads: effective_threads(threads_quantity),
            order,
            drained: false,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn pending_part_numbers(&self) -> Vec<u32> {
        self.pending.iter().map(|p| p.part_number).collect()
    }

    pub fn uploaded(&self) -> &[UploadedPart] {
        &self.uploaded
    }

    /// Takes the next part to send, if a slot is free and a part is waiting.
    pub fn next_dispatch(&mut self) -> Option<Part> {
        if self.active.len() >= self.threads {
            return None;
        }
        let part = match self.order {
            DispatchOrder::Lifo => self.pending.pop_back(),
            DispatchOrder::Fifo => self.pending.pop_front(),
        }?;
        self.active.insert(part.part_number, part.clone());
        Some(part)
    }

    /// Records the receipt of an active part. Returns `false` if the part was
    /// not active (already completed, or never dispatched).
    pub fn complete(&mut self, part_number: u32, etag: String) -> bool {
        if self.active.remove(&part_number).is_none() {
            return false;
        }
        self.uploaded.push(UploadedPart { part_number, etag });
        true
    }

    /// Returns a failed part to the pending queue so it is not lost.
    pub fn fail(&mut self, part_number: u32) {
        if let Some(part) = self.active.remove(&part_number) {
            match self.order {
                DispatchOrder::Lifo => self.pending.push_back(part),
                DispatchOrder::Fifo => self.pending.push_front(part),
            }
        }
    }

    /// Yields the receipts sorted by part number the first time nothing is
    /// pending or active. Every later call returns `None`.
    pub fn take_drained(&mut self) -> Option<Vec<UploadedPart>> {
        if self.drained || !self.pending.is_empty() || !self.active.is_empty() {
            return None;
        }
        self.drained = true;
        let mut parts = std::mem::take(&mut self.uploaded);
        parts.sort_by_key(|p| p.part_number);
        Some(parts)
    }
}

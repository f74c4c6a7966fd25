//! Progress snapshot reported to the caller while an upload runs.

use serde::Serialize;

/// Aggregate transfer progress across all parts of one upload.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Bytes sent so far, capped at `total_bytes`.
    pub sent_bytes: u64,

    pub total_bytes: u64,

    /// `round(sent / total * 100)`, 100 for an empty source.
    pub percentage: u8,
}

impl ProgressSnapshot {
    pub fn new(sent_bytes: u64, total_bytes: u64) -> Self {
        let sent_bytes = sent_bytes.min(total_bytes);
        Self {
            sent_bytes,
            total_bytes,
            percentage: percentage(sent_bytes, total_bytes),
        }
    }

    /// Snapshot reported for a zero-byte source, which has no parts to send.
    pub fn empty_source() -> Self {
        Self::new(0, 0)
    }

    pub fn is_complete(&self) -> bool {
        self.percentage == 100
    }
}

fn percentage(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let ratio = sent.min(total) as f64 / total as f64;
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

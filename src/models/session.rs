//! Represents multipart upload sessions and parts.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::attachment::AttachmentType;

/// A multipart upload session, created by the server before any part is sent.
///
/// Lives only in memory for the duration of one upload; an abandoned session
/// is never resumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSession {
    /// Opaque upload identifier issued by the server.
    pub upload_id: String,

    /// Object key in the blob store.
    pub storage_key: String,

    /// MIME type of the source.
    pub content_type: String,

    /// Category the finalized attachment belongs to.
    pub attachment_type: AttachmentType,

    /// Owning entity the attachment is linked to.
    pub related_id: String,

    /// Size of the source in bytes.
    pub total_size: u64,

    /// Fixed part size in bytes (never zero).
    pub chunk_size: u64,

    /// `ceil(total_size / chunk_size)`, checked to fit a part number.
    pub part_count: u32,
}

impl UploadSession {
    /// Byte range covered by a 1-based part number, clipped to the source length.
    pub fn part_range(&self, part_number: u32) -> Range<u64> {
        part_range(self.total_size, self.chunk_size, part_number)
    }
}

/// `ceil(total_size / chunk_size)`; zero for an empty source.
///
/// `None` when the count does not fit a `u32` part number.
pub fn part_count(total_size: u64, chunk_size: u64) -> Option<u32> {
    debug_assert!(chunk_size > 0);
    u32::try_from(total_size.div_ceil(chunk_size)).ok()
}

/// `[(n-1)*chunk, min(n*chunk, total))` for a 1-based part number.
pub fn part_range(total_size: u64, chunk_size: u64, part_number: u32) -> Range<u64> {
    debug_assert!(part_number >= 1);
    let index = u64::from(part_number.saturating_sub(1));
    let start = (index * chunk_size).min(total_size);
    let end = (start + chunk_size).min(total_size);
    start..end
}

/// One contiguous byte range of the source with its single-use upload URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    /// 1-based part number.
    pub part_number: u32,

    /// Pre-signed PUT URL for this part only.
    pub signed_url: String,

    /// Bytes of the source this part carries.
    pub range: Range<u64>,
}

impl Part {
    /// Size of the part in bytes.
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receipt for a part the blob store accepted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,

    /// Blob-store ETag with quote characters removed.
    #[serde(rename = "ETag")]
    pub etag: String,
}

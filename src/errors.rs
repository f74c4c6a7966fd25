//! Error taxonomy for the uploader.
//!
//! `ApiError` covers the RPC endpoint, `TransportError` covers direct part
//! PUTs against the blob store, and `UploadError` is what the caller sees:
//! one variant per stage of the upload, each carrying the underlying error.

use std::{io, time::Duration};
use thiserror::Error;

/// Failure talking to the upload API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    /// The server answered but rejected the operation.
    #[error("API rejected request: {0}")]
    Rejected(String),

    #[error("API response missing `{0}`")]
    MissingData(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure sending one part to its signed URL.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("blob store returned status {0}")]
    UnexpectedStatus(u16),

    #[error("blob store response has no ETag header")]
    MissingEtag,

    #[error("reading part bytes: {0}")]
    Io(#[from] io::Error),

    #[error("part transfer timed out after {0:?}")]
    TimedOut(Duration),
}

/// Why an upload did not produce an attachment.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload already started")]
    AlreadyStarted,

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("{total_size} bytes in {chunk_size}-byte chunks exceeds the part number range")]
    TooManyParts { total_size: u64, chunk_size: u64 },

    #[error("failed to create multipart upload: {0}")]
    Session(#[source] ApiError),

    #[error("failed to get signed URL for part {part_number}: {source}")]
    PartUrl {
        part_number: u32,
        #[source]
        source: ApiError,
    },

    #[error("part {part_number} upload failed: {source}")]
    PartTransfer {
        part_number: u32,
        #[source]
        source: TransportError,
    },

    #[error("failed to complete multipart upload: {0}")]
    Finalize(#[source] ApiError),

    /// Cancelled through [`UploadHandle::abort`](crate::UploadHandle::abort).
    /// Never reported to the error callback.
    #[error("upload aborted")]
    Aborted,
}

impl UploadError {
    /// True for failures that are reported through the error callback.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, UploadError::Aborted | UploadError::AlreadyStarted)
    }
}

pub type UploadResult<T> = Result<T, UploadError>;

//! Chunked multipart upload client for attachments.
//!
//! A file is split into fixed-size parts, each part is sent straight to the
//! blob store through a pre-signed URL with bounded parallelism, and the
//! server then assembles the parts into one object and returns the persisted
//! attachment record.
//!
//! The protocol uses three RPC operations ([`UploadApi`]) and raw part PUTs
//! ([`PartTransport`]). [`ChunkedUploader`] coordinates them and reports
//! progress, completion and failure through callbacks.

pub mod errors;
pub mod models;
pub mod services;

pub use errors::{ApiError, TransportError, UploadError, UploadResult};
pub use models::{
    attachment::{Attachment, AttachmentType, UploadRequest},
    progress::ProgressSnapshot,
    session::{Part, UploadSession, UploadedPart},
};
pub use services::{
    api::{GraphqlApi, UploadApi},
    scheduler::{DEFAULT_THREADS, DispatchOrder, MAX_THREADS},
    source::UploadSource,
    transport::{HttpPartTransport, PartTransport, ProgressSink},
    uploader::{ChunkedUploader, DEFAULT_CHUNK_SIZE, UploadHandle, UploadOptions, UploadState},
};

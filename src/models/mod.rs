//! Core data models for the chunked attachment uploader.
//!
//! These types describe one multipart upload session, the byte-range parts it
//! is split into, and the attachment record the server returns once the parts
//! are assembled. Wire-facing types serialize via `serde` using the field
//! names the upload API expects.

pub mod attachment;
pub mod progress;
pub mod session;

//! Upload services: the RPC client, the blob-store transport, part sources,
//! progress aggregation, part scheduling, and the uploader that ties them
//! together.

pub mod api;
pub mod progress;
pub mod scheduler;
pub mod source;
pub mod transport;
pub mod uploader;

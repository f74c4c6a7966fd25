//! src/services/transport.rs
//!
//! Direct part uploads to the blob store. Each part is one `PUT` of its byte
//! slice to a pre-signed URL; the response must be `200 OK` with an `ETag`.

use crate::errors::TransportError;
use bytes::Bytes;
use futures::{StreamExt, stream};
use reqwest::{
    StatusCode,
    header::{CONTENT_LENGTH, ETAG},
};
use std::{convert::Infallible, future::Future};
use tokio::sync::mpsc;

/// Granularity at which a part body is handed to the HTTP stack, and therefore
/// at which upload progress is reported.
pub const PROGRESS_SLICE_SIZE: usize = 64 * 1024;

/// Cumulative bytes sent for one part.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartProgress {
    pub part_number: u32,
    pub loaded: u64,
}

/// Reports transport-level progress for one part back to the uploader.
#[derive(Clone, Debug)]
pub struct ProgressSink {
    part_number: u32,
    tx: mpsc::UnboundedSender<PartProgress>,
}

impl ProgressSink {
    pub fn new(part_number: u32, tx: mpsc::UnboundedSender<PartProgress>) -> Self {
        Self { part_number, tx }
    }

    pub fn part_number(&self) -> u32 {
        self.part_number
    }

    /// Records that `loaded` bytes of this part have been sent so far.
    pub fn report(&self, loaded: u64) {
        // The receiver is gone once the upload has ended; late reports are moot.
        let _ = self.tx.send(PartProgress {
            part_number: self.part_number,
            loaded,
        });
    }
}

/// Sends one part to the blob store and returns its ETag (quotes stripped).
pub trait PartTransport {
    fn put_part(
        &self,
        signed_url: &str,
        body: Bytes,
        progress: ProgressSink,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// `PartTransport` over plain HTTP with a streamed request body.
#[derive(Clone, Default)]
pub struct HttpPartTransport {
    http: reqwest::Client,
}

impl HttpPartTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl PartTransport for HttpPartTransport {
    async fn put_part(
        &self,
        signed_url: &str,
        body: Bytes,
        progress: ProgressSink,
    ) -> Result<String, TransportError> {
        let len = body.len();
        let mut loaded = 0u64;
        let slices = stream::iter(slice_body(body)).map(move |slice| {
            loaded += slice.len() as u64;
            progress.report(loaded);
            Ok::<_, Infallible>(slice)
        });

        let resp = self
            .http
            .put(signed_url)
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(slices))
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(TransportError::UnexpectedStatus(resp.status().as_u16()));
        }

        resp.headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(strip_etag_quotes)
            .filter(|etag| !etag.is_empty())
            .ok_or(TransportError::MissingEtag)
    }
}

/// Splits a part body into zero-copy slices of at most [`PROGRESS_SLICE_SIZE`].
fn slice_body(body: Bytes) -> Vec<Bytes> {
    let mut slices = Vec::with_capacity(body.len().div_ceil(PROGRESS_SLICE_SIZE));
    let mut offset = 0;
    while offset < body.len() {
        let end = (offset + PROGRESS_SLICE_SIZE).min(body.len());
        slices.push(body.slice(offset..end));
        offset = end;
    }
    slices
}

/// Removes every `"` from an ETag header value.
pub fn strip_etag_quotes(raw: &str) -> String {
    raw.replace('"', "")
}

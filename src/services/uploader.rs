//! src/services/uploader.rs
//!
//! ChunkedUploader drives one multipart upload end to end:
//! create the session, presign every part in order, send parts with bounded
//! concurrency while aggregating progress, then finalize with the sorted part
//! receipts. All transfers are polled from the task that called `start`, so
//! the scheduler state needs no locking.

use crate::{
    errors::{TransportError, UploadError, UploadResult},
    models::{
        attachment::{Attachment, UploadRequest},
        progress::ProgressSnapshot,
        session::{Part, UploadSession, UploadedPart, part_count},
    },
    services::{
        api::{CompleteMultipartUploadInput, CreateMultipartUploadInput, PresignPartInput, UploadApi},
        progress::ProgressAggregator,
        scheduler::{DEFAULT_THREADS, DispatchOrder, PartScheduler},
        source::UploadSource,
        transport::{PartTransport, ProgressSink},
    },
};
use futures::{StreamExt, stream::FuturesUnordered};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default part size: 5 MiB, the smallest part most blob stores accept.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Lifecycle of one upload. `Failed` is reachable from every non-idle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Initializing,
    Uploading,
    Finalizing,
    Done,
    Failed,
}

/// Tuning knobs for one upload.
#[derive(Clone, Debug)]
pub struct UploadOptions {
    /// Part size in bytes; must be non-zero.
    pub chunk_size: u64,

    /// Requested parallel part transfers, clamped to `1..=15`.
    pub threads_quantity: usize,

    pub dispatch_order: DispatchOrder,

    /// Fail a part whose transfer takes longer than this. `None` waits forever.
    pub part_timeout: Option<Duration>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            threads_quantity: DEFAULT_THREADS,
            dispatch_order: DispatchOrder::default(),
            part_timeout: None,
        }
    }
}

type ProgressCallback = Box<dyn Fn(ProgressSnapshot) + Send + Sync>;
type FinishCallback = Box<dyn Fn(&Attachment) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&UploadError) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    progress: Option<ProgressCallback>,
    finish: Option<FinishCallback>,
    error: Option<ErrorCallback>,
}

/// Observes and cancels an upload from outside the task running it.
#[derive(Clone, Debug)]
pub struct UploadHandle {
    state: watch::Receiver<UploadState>,
    cancel: CancellationToken,
}

impl UploadHandle {
    pub fn state(&self) -> UploadState {
        *self.state.borrow()
    }

    /// Cancels the upload. In-flight part transfers are dropped and no further
    /// callbacks fire; `start` returns [`UploadError::Aborted`].
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// Waits until the upload reaches `Done` or `Failed`.
    pub async fn finished(&mut self) -> UploadState {
        match self
            .state
            .wait_for(|s| matches!(s, UploadState::Done | UploadState::Failed))
            .await
        {
            Ok(state) => *state,
            // Uploader dropped mid-flight: nothing will ever finish it.
            Err(_) => UploadState::Failed,
        }
    }
}

/// Multipart upload client for one source.
///
/// ```no_run
/// # use attachment_uploader::*;
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let api = GraphqlApi::new("https://api.example.com/graphql", Some("token"))?;
/// let request = UploadRequest::new("42", AttachmentType::MapRow, "image/png", "png");
/// let mut uploader = ChunkedUploader::new(
///     api,
///     HttpPartTransport::default(),
///     UploadSource::open("diagram.png").await?,
///     request,
///     UploadOptions::default(),
/// )
/// .on_progress(|p| println!("{}%", p.percentage))
/// .on_error(|e| eprintln!("upload failed: {e}"));
/// let attachment = uploader.start().await?;
/// println!("stored as {}", attachment.key);
/// # Ok(())
/// # }
/// ```
pub struct ChunkedUploader<A, T> {
    api: A,
    transport: T,
    source: UploadSource,
    request: UploadRequest,
    options: UploadOptions,
    callbacks: Callbacks,
    state: watch::Sender<UploadState>,
    cancel: CancellationToken,
}

impl<A, T> ChunkedUploader<A, T>
where
    A: UploadApi,
    T: PartTransport,
{
    pub fn new(
        api: A,
        transport: T,
        source: UploadSource,
        request: UploadRequest,
        options: UploadOptions,
    ) -> Self {
        let (state, _) = watch::channel(UploadState::Idle);
        Self {
            api,
            transport,
            source,
            request,
            options,
            callbacks: Callbacks::default(),
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// Called with a fresh snapshot on every progress change.
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(ProgressSnapshot) + Send + Sync + 'static,
    {
        self.callbacks.progress = Some(Box::new(f));
        self
    }

    /// Called once with the finalized attachment.
    pub fn on_finish<F>(mut self, f: F) -> Self
    where
        F: Fn(&Attachment) + Send + Sync + 'static,
    {
        self.callbacks.finish = Some(Box::new(f));
        self
    }

    /// Called once if the upload fails. Not called on abort.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&UploadError) + Send + Sync + 'static,
    {
        self.callbacks.error = Some(Box::new(f));
        self
    }

    pub fn handle(&self) -> UploadHandle {
        UploadHandle {
            state: self.state.subscribe(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn state(&self) -> UploadState {
        *self.state.borrow()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs the upload to completion.
    ///
    /// Only the first call does anything; later calls return
    /// [`UploadError::AlreadyStarted`] without touching the callbacks.
    pub async fn start(&mut self) -> UploadResult<Attachment> {
        if self.state() != UploadState::Idle {
            return Err(UploadError::AlreadyStarted);
        }
        self.set_state(UploadState::Initializing);

        let cancel = self.cancel.clone();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Aborted),
            result = self.run() => result,
        };

        match &outcome {
            Ok(attachment) => {
                self.set_state(UploadState::Done);
                info!(id = %attachment.id, key = %attachment.key, "upload finished");
                if let Some(cb) = &self.callbacks.finish {
                    cb(attachment);
                }
            }
            Err(err) if !err.is_reportable() => {
                self.set_state(UploadState::Failed);
                info!(error = %err, "upload stopped");
            }
            Err(err) => {
                self.set_state(UploadState::Failed);
                warn!(error = %err, "upload failed");
                if let Some(cb) = &self.callbacks.error {
                    cb(err);
                }
            }
        }

        outcome
    }

    fn set_state(&self, state: UploadState) {
        debug!(?state, "upload state");
        self.state.send_replace(state);
    }

    fn emit_progress(&self, snapshot: ProgressSnapshot) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(cb) = &self.callbacks.progress {
            cb(snapshot);
        }
    }

    async fn run(&self) -> UploadResult<Attachment> {
        let chunk_size = self.options.chunk_size;
        if chunk_size == 0 {
            return Err(UploadError::InvalidChunkSize);
        }
        let total_size = self.source.len();
        let count = part_count(total_size, chunk_size).ok_or(UploadError::TooManyParts {
            total_size,
            chunk_size,
        })?;

        let session = self.initialize(count).await?;
        self.set_state(UploadState::Uploading);

        let parts = if session.part_count == 0 {
            self.emit_progress(ProgressSnapshot::empty_source());
            Vec::new()
        } else {
            let parts = self.request_part_urls(&session).await?;
            self.upload_parts(&session, parts).await?
        };

        self.set_state(UploadState::Finalizing);
        self.finalize(&session, parts).await
    }

    async fn initialize(&self, part_count: u32) -> UploadResult<UploadSession> {
        let input = CreateMultipartUploadInput {
            id: self.request.related_id.clone(),
            content_type: self.request.content_type.clone(),
            attachment_type: self.request.attachment_type,
            file_type: self.request.file_type.clone(),
        };
        let created = self
            .api
            .create_multipart_upload(&input)
            .await
            .map_err(UploadError::Session)?;

        let session = UploadSession {
            upload_id: created.upload_id,
            storage_key: created.key,
            content_type: self.request.content_type.clone(),
            attachment_type: self.request.attachment_type,
            related_id: self.request.related_id.clone(),
            total_size: self.source.len(),
            chunk_size: self.options.chunk_size,
            part_count,
        };
        info!(
            upload_id = %session.upload_id,
            key = %session.storage_key,
            size = session.total_size,
            parts = session.part_count,
            "multipart upload created"
        );
        Ok(session)
    }

    /// Presigns parts one at a time, in ascending order. Stops at the first
    /// failure.
    async fn request_part_urls(&self, session: &UploadSession) -> UploadResult<Vec<Part>> {
        let count = session.part_count;
        let mut parts = Vec::with_capacity(count as usize);
        for part_number in 1..=count {
            let input = PresignPartInput {
                upload_id: session.upload_id.clone(),
                name: session.storage_key.clone(),
                parts: part_number,
            };
            let signed_url = self
                .api
                .get_presigned_url(&input)
                .await
                .map_err(|source| UploadError::PartUrl {
                    part_number,
                    source,
                })?;
            parts.push(Part {
                part_number,
                signed_url,
                range: session.part_range(part_number),
            });
        }
        Ok(parts)
    }

    async fn upload_parts(
        &self,
        session: &UploadSession,
        parts: Vec<Part>,
    ) -> UploadResult<Vec<UploadedPart>> {
        let mut scheduler = PartScheduler::new(
            parts,
            self.options.threads_quantity,
            self.options.dispatch_order,
        );
        let mut progress = ProgressAggregator::new(session.total_size);
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let mut in_flight = FuturesUnordered::new();

        debug!(threads = scheduler.threads(), "uploading parts");

        loop {
            while let Some(part) = scheduler.next_dispatch() {
                debug!(
                    part_number = part.part_number,
                    active = scheduler.active_count(),
                    "dispatching part"
                );
                let sink = ProgressSink::new(part.part_number, progress_tx.clone());
                in_flight.push(self.send_part(part, sink));
            }

            if let Some(uploaded) = scheduler.take_drained() {
                return Ok(uploaded);
            }

            tokio::select! {
                Some(update) = progress_rx.recv() => {
                    if let Some(snapshot) = progress.record(update.part_number, update.loaded) {
                        self.emit_progress(snapshot);
                    }
                }
                Some((part, result)) = in_flight.next() => match result {
                    Ok(etag) => {
                        debug!(part_number = part.part_number, %etag, "part uploaded");
                        scheduler.complete(part.part_number, etag);
                        self.emit_progress(progress.complete(part.part_number, part.len()));
                    }
                    Err(source) => {
                        scheduler.fail(part.part_number);
                        self.emit_progress(progress.evict(part.part_number));
                        warn!(
                            upload_id = %session.upload_id,
                            part_number = part.part_number,
                            pending = ?scheduler.pending_part_numbers(),
                            "part upload failed: {}",
                            source
                        );
                        return Err(UploadError::PartTransfer {
                            part_number: part.part_number,
                            source,
                        });
                    }
                },
            }
        }
    }

    async fn send_part(
        &self,
        part: Part,
        sink: ProgressSink,
    ) -> (Part, Result<String, TransportError>) {
        let result = self.transfer(&part, sink).await;
        (part, result)
    }

    async fn transfer(&self, part: &Part, sink: ProgressSink) -> Result<String, TransportError> {
        let body = self.source.read_range(part.range.clone()).await?;
        let put = self.transport.put_part(&part.signed_url, body, sink);
        match self.options.part_timeout {
            Some(limit) => tokio::time::timeout(limit, put)
                .await
                .map_err(|_| TransportError::TimedOut(limit))?,
            None => put.await,
        }
    }

    async fn finalize(
        &self,
        session: &UploadSession,
        parts: Vec<UploadedPart>,
    ) -> UploadResult<Attachment> {
        let input = CompleteMultipartUploadInput {
            upload_id: session.upload_id.clone(),
            key: session.storage_key.clone(),
            attachment_type: self.request.attachment_type,
            category: self.request.category.clone(),
            name: self.request.file_name.clone(),
            related_id: self.request.related_id.clone(),
            parts,
            detailed_input: self.request.detailed_input.clone(),
            embed_map_input: self.request.embed_map_input.clone(),
        };

        self.api
            .complete_multipart_upload(&input)
            .await
            .map_err(|source| {
                // No abort call exists in the protocol; the parts stay in the blob store.
                warn!(
                    upload_id = %session.upload_id,
                    key = %session.storage_key,
                    parts = input.parts.len(),
                    "finalize failed, uploaded parts left orphaned"
                );
                UploadError::Finalize(source)
            })
    }
}

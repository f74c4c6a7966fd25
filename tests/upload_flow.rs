//! End-to-end uploads through `GraphqlApi` and `HttpPartTransport` against
//! the in-process backend in `common`.

mod common;

use attachment_uploader::{
    ApiError, AttachmentType, ChunkedUploader, DispatchOrder, GraphqlApi, HttpPartTransport,
    TransportError, UploadError, UploadOptions, UploadRequest, UploadSource, UploadState,
};
use common::{Backend, BackendOptions};
use serde_json::json;
use std::{
    io::Write,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering::SeqCst},
    },
};
use tempfile::NamedTempFile;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn request() -> UploadRequest {
    UploadRequest::new("17", AttachmentType::MapRow, "application/octet-stream", "bin")
        .with_file_name("journey.bin")
        .with_category("diagram")
}

fn options(chunk_size: u64, threads_quantity: usize) -> UploadOptions {
    UploadOptions {
        chunk_size,
        threads_quantity,
        ..UploadOptions::default()
    }
}

#[derive(Clone, Default)]
struct Observed {
    percentages: Arc<Mutex<Vec<u8>>>,
    finished: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

fn uploader(
    backend: &Backend,
    source: UploadSource,
    request: UploadRequest,
    options: UploadOptions,
    observed: &Observed,
) -> ChunkedUploader<GraphqlApi, HttpPartTransport> {
    let api = GraphqlApi::new(backend.graphql_url(), Some("secret-token")).unwrap();
    let percentages = Arc::clone(&observed.percentages);
    let finished = Arc::clone(&observed.finished);
    let errors = Arc::clone(&observed.errors);
    ChunkedUploader::new(api, HttpPartTransport::default(), source, request, options)
        .on_progress(move |p| percentages.lock().unwrap().push(p.percentage))
        .on_finish(move |_| {
            finished.fetch_add(1, SeqCst);
        })
        .on_error(move |_| {
            errors.fetch_add(1, SeqCst);
        })
}

#[tokio::test]
async fn memory_source_is_assembled_in_part_order() {
    let backend = Backend::spawn(BackendOptions::default()).await;
    let observed = Observed::default();
    let data = payload(300_000);
    let mut up = uploader(
        &backend,
        UploadSource::from_bytes(data.clone()),
        request().with_detailed_input(json!({ "rowId": 9 })),
        options(65_536, 3),
        &observed,
    );

    let attachment = up.start().await.unwrap();

    assert_eq!(attachment.id, "101");
    assert_eq!(attachment.name.as_deref(), Some("journey.bin"));
    assert_eq!(attachment.attachment_type, Some(AttachmentType::MapRow));
    assert_eq!(up.state(), UploadState::Done);

    let recorded = backend.recorded();
    assert_eq!(recorded.sessions_created, 1);
    assert_eq!(recorded.presigned, vec![1, 2, 3, 4, 5]);
    assert_eq!(recorded.completed_part_numbers(), Some(vec![1, 2, 3, 4, 5]));
    assert_eq!(recorded.objects.get(&attachment.key), Some(&data));

    let completion = &recorded.completions[0];
    assert_eq!(completion["relatedId"], json!("17"));
    assert_eq!(completion["category"], json!("diagram"));
    assert_eq!(completion["detailedInput"], json!({ "rowId": 9 }));
    assert!(completion.get("embedMapInput").is_none());

    let percentages = observed.percentages.lock().unwrap().clone();
    assert!(percentages.windows(2).all(|w| w[0] <= w[1]), "{percentages:?}");
    assert_eq!(percentages.last(), Some(&100));
    assert_eq!(observed.finished.load(SeqCst), 1);
    assert_eq!(observed.errors.load(SeqCst), 0);
}

#[tokio::test]
async fn file_source_with_exact_multiple_has_no_trailing_part() {
    let backend = Backend::spawn(BackendOptions::default()).await;
    let data = payload(200_000);
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&data).unwrap();

    let source = UploadSource::open(file.path()).await.unwrap();
    let options = UploadOptions {
        dispatch_order: DispatchOrder::Fifo,
        ..options(50_000, 2)
    };
    let mut up = uploader(&backend, source, request(), options, &Observed::default());

    let attachment = up.start().await.unwrap();

    let recorded = backend.recorded();
    assert_eq!(recorded.presigned, vec![1, 2, 3, 4]);
    assert_eq!(recorded.put_attempts.len(), 4);
    assert_eq!(recorded.objects.get(&attachment.key), Some(&data));
}

#[tokio::test]
async fn empty_source_finalizes_without_part_traffic() {
    let backend = Backend::spawn(BackendOptions::default()).await;
    let observed = Observed::default();
    let mut up = uploader(
        &backend,
        UploadSource::from_bytes(Vec::new()),
        request(),
        UploadOptions::default(),
        &observed,
    );

    let attachment = up.start().await.unwrap();

    let recorded = backend.recorded();
    assert!(recorded.presigned.is_empty());
    assert!(recorded.put_attempts.is_empty());
    assert_eq!(recorded.completed_part_numbers(), Some(vec![]));
    assert_eq!(recorded.objects.get(&attachment.key), Some(&Vec::new()));
    assert_eq!(*observed.percentages.lock().unwrap(), vec![100]);
    assert_eq!(observed.finished.load(SeqCst), 1);
}

#[tokio::test]
async fn failed_part_reports_once_and_skips_completion() {
    let backend = Backend::spawn(BackendOptions {
        fail_parts: vec![2],
        ..Default::default()
    })
    .await;
    let observed = Observed::default();
    let mut up = uploader(
        &backend,
        UploadSource::from_bytes(payload(150_000)),
        request(),
        options(50_000, 5),
        &observed,
    );

    let err = up.start().await.unwrap_err();

    assert!(matches!(
        err,
        UploadError::PartTransfer {
            part_number: 2,
            source: TransportError::UnexpectedStatus(500)
        }
    ));
    assert_eq!(observed.errors.load(SeqCst), 1);
    assert_eq!(observed.finished.load(SeqCst), 0);
    assert_eq!(up.state(), UploadState::Failed);
    assert!(backend.recorded().completions.is_empty());
}

#[tokio::test]
async fn rejected_session_never_presigns() {
    let backend = Backend::spawn(BackendOptions {
        reject_create: true,
        ..Default::default()
    })
    .await;
    let observed = Observed::default();
    let mut up = uploader(
        &backend,
        UploadSource::from_bytes(payload(10)),
        request(),
        UploadOptions::default(),
        &observed,
    );

    let err = up.start().await.unwrap_err();

    match err {
        UploadError::Session(ApiError::Rejected(message)) => {
            assert_eq!(message, "related entity not found")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(backend.recorded().presigned.is_empty());
    assert_eq!(observed.errors.load(SeqCst), 1);
}

#[tokio::test]
async fn bearer_token_is_sent_with_every_rpc() {
    let backend = Backend::spawn(BackendOptions::default()).await;
    let mut up = uploader(
        &backend,
        UploadSource::from_bytes(payload(20)),
        request(),
        options(10, 1),
        &Observed::default(),
    );

    up.start().await.unwrap();

    let recorded = backend.recorded();
    // create + two presigns + complete
    assert_eq!(recorded.authorization.len(), 4);
    assert!(
        recorded
            .authorization
            .iter()
            .all(|auth| auth.as_deref() == Some("Bearer secret-token"))
    );
}

#[tokio::test]
async fn unreachable_api_is_a_session_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = GraphqlApi::new(format!("http://{addr}/graphql"), None).unwrap();
    let mut up = ChunkedUploader::new(
        api,
        HttpPartTransport::default(),
        UploadSource::from_bytes(payload(10)),
        request(),
        UploadOptions::default(),
    );

    let err = up.start().await.unwrap_err();
    assert!(matches!(err, UploadError::Session(ApiError::Http(_))));
}

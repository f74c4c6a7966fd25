use anyhow::{Context, Result};
use attachment_uploader::{
    ChunkedUploader, GraphqlApi, HttpPartTransport, UploadError, UploadRequest, UploadSource,
};
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};
use tracing_subscriber::EnvFilter;

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;
    tracing::debug!("Starting attachment-upload with config: {:?}", cfg);

    // --- Open the source ---
    let source = UploadSource::open(&cfg.file)
        .await
        .with_context(|| format!("opening {}", cfg.file.display()))?;
    tracing::info!("Uploading {} ({} bytes)", cfg.file.display(), source.len());

    // --- Build clients ---
    let api = GraphqlApi::new(&cfg.api_url, cfg.token.as_deref())
        .context("building API client")?;
    let transport = HttpPartTransport::new(reqwest::Client::new());

    let mut request = UploadRequest::new(
        &cfg.related_id,
        cfg.attachment_type,
        &cfg.content_type,
        &cfg.file_type,
    )
    .with_file_name(&cfg.file_name);
    if let Some(category) = &cfg.category {
        request = request.with_category(category);
    }

    // Progress is reported on every byte-slice; only log whole-percent changes.
    let last_percentage = Arc::new(AtomicU8::new(u8::MAX));
    let mut uploader = ChunkedUploader::new(api, transport, source, request, cfg.upload_options())
        .on_progress(move |p| {
            if last_percentage.swap(p.percentage, Ordering::Relaxed) == p.percentage {
                return;
            }
            if p.is_complete() {
                tracing::info!(total = p.total_bytes, "all parts sent, finalizing");
            } else {
                tracing::info!(
                    sent = p.sent_bytes,
                    total = p.total_bytes,
                    "progress {}%",
                    p.percentage
                );
            }
        })
        .on_error(|err| tracing::error!("Upload failed: {}", err));

    // --- Cancel on Ctrl-C ---
    let handle = uploader.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, aborting upload");
            handle.abort();
        }
    });

    match uploader.start().await {
        Ok(attachment) => {
            println!("{}", serde_json::to_string_pretty(&attachment)?);
            Ok(())
        }
        Err(UploadError::Aborted) => anyhow::bail!("upload aborted"),
        Err(err) => Err(err.into()),
    }
}

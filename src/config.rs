use anyhow::{Context, Result, bail};
use attachment_uploader::{
    AttachmentType, DEFAULT_CHUNK_SIZE, DEFAULT_THREADS, DispatchOrder, UploadOptions,
};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Centralized uploader configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub file: PathBuf,
    pub attachment_type: AttachmentType,
    pub related_id: String,
    pub content_type: String,
    pub file_type: String,
    pub file_name: String,
    pub category: Option<String>,
    pub chunk_size: u64,
    pub threads: usize,
    pub fifo: bool,
    pub part_timeout: Option<Duration>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Upload a file as an attachment using chunked multipart upload")]
pub struct Args {
    /// File to upload
    pub file: PathBuf,

    /// Attachment category: ai-model, map-row or persona-gallery
    #[arg(long = "type", short = 't')]
    pub attachment_type: AttachmentType,

    /// Id of the entity the attachment belongs to
    #[arg(long)]
    pub related_id: String,

    /// GraphQL endpoint (overrides ATTACHMENT_UPLOAD_API_URL)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Bearer token (overrides ATTACHMENT_UPLOAD_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// MIME type (default: application/octet-stream)
    #[arg(long)]
    pub content_type: Option<String>,

    /// File type hint (default: the file extension)
    #[arg(long)]
    pub file_type: Option<String>,

    /// Name stored with the attachment (default: the file name)
    #[arg(long)]
    pub name: Option<String>,

    /// Optional attachment sub-category
    #[arg(long)]
    pub category: Option<String>,

    /// Part size in bytes (overrides ATTACHMENT_UPLOAD_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Parallel part uploads, at most 15 (overrides ATTACHMENT_UPLOAD_THREADS)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Per-part timeout in seconds (overrides ATTACHMENT_UPLOAD_PART_TIMEOUT_SECS)
    #[arg(long)]
    pub part_timeout_secs: Option<u64>,

    /// Send parts lowest-numbered first instead of highest first
    #[arg(long)]
    pub fifo: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_api_url = env::var("ATTACHMENT_UPLOAD_API_URL").ok();
        let env_token = env::var("ATTACHMENT_UPLOAD_TOKEN").ok();
        let env_chunk_size = parse_env::<u64>("ATTACHMENT_UPLOAD_CHUNK_SIZE")?;
        let env_threads = parse_env::<usize>("ATTACHMENT_UPLOAD_THREADS")?;
        let env_timeout = parse_env::<u64>("ATTACHMENT_UPLOAD_PART_TIMEOUT_SECS")?;

        // --- Merge ---
        let Some(api_url) = args.api_url.or(env_api_url) else {
            bail!("no API endpoint: pass --api-url or set ATTACHMENT_UPLOAD_API_URL");
        };

        let chunk_size = args
            .chunk_size
            .or(env_chunk_size)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            bail!("chunk size must be greater than zero");
        }

        let file_type = args.file_type.unwrap_or_else(|| {
            args.file
                .extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default()
        });
        let file_name = match args.name {
            Some(name) => name,
            None => args
                .file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .with_context(|| format!("{} has no file name", args.file.display()))?,
        };

        Ok(Self {
            api_url,
            token: args.token.or(env_token),
            attachment_type: args.attachment_type,
            related_id: args.related_id,
            content_type: args
                .content_type
                .unwrap_or_else(|| "application/octet-stream".into()),
            file_type,
            file_name,
            category: args.category,
            chunk_size,
            threads: args.threads.or(env_threads).unwrap_or(DEFAULT_THREADS),
            fifo: args.fifo,
            part_timeout: args
                .part_timeout_secs
                .or(env_timeout)
                .map(Duration::from_secs),
            file: args.file,
        })
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            chunk_size: self.chunk_size,
            threads_quantity: self.threads,
            dispatch_order: if self.fifo {
                DispatchOrder::Fifo
            } else {
                DispatchOrder::Lifo
            },
            part_timeout: self.part_timeout,
        }
    }
}

/// Reads an optional numeric environment variable.
fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

//! Where part bytes come from: an in-memory buffer or a file on disk.

use bytes::Bytes;
use std::{
    io::{self, SeekFrom},
    ops::Range,
    path::{Path, PathBuf},
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};

/// The payload being uploaded.
#[derive(Clone, Debug)]
pub enum UploadSource {
    Memory(Bytes),
    /// File read part by part; `len` is captured when the source is opened.
    File { path: PathBuf, len: u64 },
}

impl UploadSource {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        UploadSource::Memory(bytes.into())
    }

    /// Opens a file source, recording its current length.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(UploadSource::File {
            path,
            len: meta.len(),
        })
    }

    pub fn len(&self) -> u64 {
        match self {
            UploadSource::Memory(bytes) => bytes.len() as u64,
            UploadSource::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads exactly `range` from the source.
    ///
    /// A file that shrank since it was opened yields `UnexpectedEof`.
    pub async fn read_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        if range.end > self.len() || range.start > range.end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("range {range:?} outside source of {} bytes", self.len()),
            ));
        }

        match self {
            UploadSource::Memory(bytes) => Ok(bytes.slice(range.start as usize..range.end as usize)),
            UploadSource::File { path, .. } => {
                let mut file = File::open(path).await?;
                file.seek(SeekFrom::Start(range.start)).await?;
                let mut buf = vec![0u8; (range.end - range.start) as usize];
                file.read_exact(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

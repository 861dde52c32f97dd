use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use url::Url;

use crate::pipeline::{MediaBlob, ProgressFn};

const READ_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch video: {0}")]
    Network(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("invalid file url: {0}")]
    InvalidFileUrl(String),
    #[error("save failed: {0}")]
    Save(String),
}

pub type StreamResult<T> = std::result::Result<T, FetchError>;

/// Persists a finished blob under a suggested filename and reports
/// where it landed.
#[async_trait]
pub trait SaveSink: Send + Sync {
    async fn save(&self, filename: &str, blob: &MediaBlob) -> std::io::Result<PathBuf>;
}

/// Writes into a configured directory, falling back to the system temp
/// directory when that directory is unusable.
pub struct DiskSink {
    dir: PathBuf,
}

impl DiskSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SaveSink for DiskSink {
    async fn save(&self, filename: &str, blob: &MediaBlob) -> std::io::Result<PathBuf> {
        let primary = self.dir.join(filename);
        match write_blob(&primary, blob).await {
            Ok(()) => Ok(primary),
            Err(err) => {
                warn!(
                    path = %primary.display(),
                    error = %err,
                    "save directory unusable, falling back to temp directory"
                );
                let fallback = std::env::temp_dir().join(filename);
                write_blob(&fallback, blob).await?;
                Ok(fallback)
            }
        }
    }
}

async fn write_blob(path: &Path, blob: &MediaBlob) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, blob.as_bytes()).await
}

/// Alternate, simpler acquisition path: one chunked fetch with
/// byte-count progress, no relay fallback, no engine and no subtitle
/// handling.
pub struct StreamingDownloader {
    client: reqwest::Client,
    sink: Arc<dyn SaveSink>,
    filename: String,
}

impl StreamingDownloader {
    pub fn new(client: reqwest::Client, sink: Arc<dyn SaveSink>, filename: impl Into<String>) -> Self {
        Self {
            client,
            sink,
            filename: filename.into(),
        }
    }

    /// Downloads `url` and hands the assembled blob to the save sink.
    /// Percentages are reported only while a total length is known;
    /// without one no misleading figure is ever emitted.
    pub async fn download_video(
        &self,
        url: &str,
        on_progress: Option<ProgressFn>,
    ) -> StreamResult<PathBuf> {
        let blob = self.fetch_blob(url, on_progress).await?;
        let path = self
            .sink
            .save(&self.filename, &blob)
            .await
            .map_err(|err| FetchError::Save(err.to_string()))?;
        info!(path = %path.display(), bytes = blob.len(), "download saved");
        Ok(path)
    }

    async fn fetch_blob(
        &self,
        url: &str,
        on_progress: Option<ProgressFn>,
    ) -> StreamResult<MediaBlob> {
        if let Ok(parsed) = Url::parse(url) {
            if parsed.scheme() == "file" {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| FetchError::InvalidFileUrl(url.to_string()))?;
                return read_local_chunked(&path, on_progress).await;
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::Network(err.to_string()))?
            .error_for_status()
            .map_err(|err| FetchError::Network(err.to_string()))?;

        let total = response.content_length().unwrap_or(0);
        let mut stream = response.bytes_stream();
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| FetchError::Network(err.to_string()))?;
            bytes.extend_from_slice(&chunk);
            report_progress(&on_progress, bytes.len() as u64, total);
        }
        Ok(MediaBlob::video(bytes))
    }
}

async fn read_local_chunked(path: &Path, on_progress: Option<ProgressFn>) -> StreamResult<MediaBlob> {
    let io_err = |source| FetchError::Io {
        source,
        path: path.to_path_buf(),
    };
    let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
    let total = file.metadata().await.map_err(io_err)?.len();
    let mut bytes: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let read = file.read(&mut buf).await.map_err(io_err)?;
        if read == 0 {
            break;
        }
        bytes.extend_from_slice(&buf[..read]);
        report_progress(&on_progress, bytes.len() as u64, total);
    }
    Ok(MediaBlob::video(bytes))
}

fn report_progress(on_progress: &Option<ProgressFn>, received: u64, total: u64) {
    if total == 0 {
        return;
    }
    if let Some(callback) = on_progress {
        let percent = ((received as f64 / total as f64) * 100.0).round() as u8;
        callback(percent.min(100));
    }
}

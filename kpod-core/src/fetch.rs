use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::engine::{EngineError, TranscodeEngine};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to fetch {url} directly ({direct}) and via relay ({relay})")]
    BothAttemptsFailed {
        url: String,
        direct: String,
        relay: String,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("invalid file url: {0}")]
    InvalidFileUrl(String),
    #[error("engine storage error: {0}")]
    Storage(#[from] EngineError),
}

pub type FetchResult<T> = std::result::Result<T, DownloadError>;

/// Fetches resources into engine working storage with a
/// direct-then-relay fallback. `file://` URLs are read from the local
/// filesystem directly. No concurrency control: callers serialize
/// calls targeting overlapping names.
#[derive(Clone)]
pub struct ResourceFetcher {
    client: reqwest::Client,
    relay_prefix: String,
}

impl ResourceFetcher {
    pub fn new(client: reqwest::Client, relay_prefix: impl Into<String>) -> Self {
        Self {
            client,
            relay_prefix: relay_prefix.into(),
        }
    }

    /// Rewrites a blocked URL to route through the relay.
    pub fn relay_url(&self, url: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
        format!("{}{}", self.relay_prefix, encoded)
    }

    /// Reads `url` and writes the bytes into `engine` storage at `name`.
    /// On any failure of the attempt, the storage write included,
    /// exactly one retry is made through the relay against the same
    /// name; if that also fails the error carries both underlying
    /// causes.
    pub async fn fetch_into<E>(&self, engine: &E, url: &str, name: &str) -> FetchResult<()>
    where
        E: TranscodeEngine + ?Sized,
    {
        match self.attempt(engine, url, name).await {
            Ok(()) => Ok(()),
            Err(direct_err) => {
                let relay = self.relay_url(url);
                warn!(%url, error = %direct_err, "direct fetch failed, retrying via relay");
                self.attempt(engine, &relay, name)
                    .await
                    .map_err(|relay_err| DownloadError::BothAttemptsFailed {
                        url: url.to_string(),
                        direct: direct_err.to_string(),
                        relay: relay_err.to_string(),
                    })
            }
        }
    }

    /// One complete fetch-and-store attempt.
    async fn attempt<E>(&self, engine: &E, url: &str, name: &str) -> FetchResult<()>
    where
        E: TranscodeEngine + ?Sized,
    {
        let bytes = self.fetch_bytes(url).await?;
        debug!(%url, %name, bytes = bytes.len(), "resource written to working storage");
        engine.write_file(name, &bytes).await?;
        Ok(())
    }

    pub async fn fetch_bytes(&self, url: &str) -> FetchResult<Vec<u8>> {
        if let Ok(parsed) = Url::parse(url) {
            if parsed.scheme() == "file" {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| DownloadError::InvalidFileUrl(url.to_string()))?;
                return tokio::fs::read(&path)
                    .await
                    .map_err(|source| DownloadError::Io { path, source });
            }
        }
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| DownloadError::Network(err.to_string()))?
            .error_for_status()
            .map_err(|err| DownloadError::Network(err.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| DownloadError::Network(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

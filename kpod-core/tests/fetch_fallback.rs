use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use kpod_core::engine::{EngineError, EngineResult, ProgressSender, TranscodeEngine};
use kpod_core::fetch::{DownloadError, ResourceFetcher};

/// Minimal storage-only engine double.
#[derive(Default)]
struct MapEngine {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: bool,
}

impl MapEngine {
    fn stored(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl TranscodeEngine for MapEngine {
    async fn load(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> EngineResult<()> {
        if self.fail_writes {
            return Err(EngineError::Io {
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                path: name.into(),
            });
        }
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> EngineResult<Vec<u8>> {
        self.stored(name)
            .ok_or_else(|| EngineError::MissingFile(name.to_string()))
    }

    async fn delete_file(&self, name: &str) -> EngineResult<()> {
        self.files.lock().unwrap().remove(name);
        Ok(())
    }

    async fn exec(&self, _command: &[String], _progress: Option<ProgressSender>) -> EngineResult<()> {
        Ok(())
    }
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

#[tokio::test]
async fn direct_fetch_writes_into_engine() {
    let base = TempDir::new().unwrap();
    let source = base.path().join("clip.mp4");
    std::fs::write(&source, b"CLIP-BYTES").unwrap();

    let engine = MapEngine::default();
    let fetcher = ResourceFetcher::new(reqwest::Client::new(), "file:///nonexistent-relay/");

    fetcher
        .fetch_into(&engine, &file_url(&source), "input.mp4")
        .await
        .unwrap();

    assert_eq!(engine.stored("input.mp4").unwrap(), b"CLIP-BYTES");
}

#[tokio::test]
async fn relay_retry_succeeds_after_direct_failure() {
    let base = TempDir::new().unwrap();
    let relay_dir = base.path().join("relay");
    std::fs::create_dir_all(&relay_dir).unwrap();
    std::fs::write(relay_dir.join("clip.mp4"), b"RELAYED-BYTES").unwrap();

    let engine = MapEngine::default();
    // "clip.mp4" is not an absolute URL, so the direct attempt always
    // fails; the relay prefix turns it into a resolvable file URL.
    let relay_prefix = format!("file://{}/", relay_dir.display());
    let fetcher = ResourceFetcher::new(reqwest::Client::new(), relay_prefix);

    fetcher
        .fetch_into(&engine, "clip.mp4", "input.mp4")
        .await
        .unwrap();

    assert_eq!(engine.stored("input.mp4").unwrap(), b"RELAYED-BYTES");
}

#[tokio::test]
async fn both_attempts_failing_reports_both_causes() {
    let base = TempDir::new().unwrap();
    let missing = file_url(&base.path().join("missing.mp4"));

    let engine = MapEngine::default();
    let fetcher = ResourceFetcher::new(reqwest::Client::new(), "file:///nonexistent-relay/");

    let err = fetcher
        .fetch_into(&engine, &missing, "input.mp4")
        .await
        .unwrap_err();

    match err {
        DownloadError::BothAttemptsFailed { url, direct, relay } => {
            assert_eq!(url, missing);
            assert!(!direct.is_empty());
            assert!(!relay.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
    // Nothing is written on failure.
    assert!(engine.stored("input.mp4").is_none());
}

#[tokio::test]
async fn storage_failure_is_retried_through_the_relay() {
    let base = TempDir::new().unwrap();
    let source = base.path().join("clip.mp4");
    std::fs::write(&source, b"CLIP-BYTES").unwrap();

    let engine = MapEngine {
        fail_writes: true,
        ..MapEngine::default()
    };
    let fetcher = ResourceFetcher::new(reqwest::Client::new(), "file:///nonexistent-relay/");

    let err = fetcher
        .fetch_into(&engine, &file_url(&source), "input.mp4")
        .await
        .unwrap_err();

    // The write is part of the retried attempt: a storage failure on a
    // successful direct fetch still triggers the relay pass, and the
    // combined error reports both causes.
    match err {
        DownloadError::BothAttemptsFailed { direct, relay, .. } => {
            assert!(direct.contains("disk full"));
            assert!(!relay.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

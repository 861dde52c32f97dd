use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use kpod_core::download::{DiskSink, StreamingDownloader};
use kpod_core::ProgressFn;

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn collecting_progress() -> (ProgressFn, Arc<Mutex<Vec<u8>>>) {
    let seen: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: ProgressFn = Arc::new(move |percent| {
        sink.lock().unwrap().push(percent);
    });
    (callback, seen)
}

#[tokio::test]
async fn downloads_and_saves_byte_identical_copy() {
    let base = TempDir::new().unwrap();
    let source_bytes = patterned_bytes(150_000);
    let source = base.path().join("episode.mp4");
    std::fs::write(&source, &source_bytes).unwrap();

    let save_dir = base.path().join("downloads");
    let sink = Arc::new(DiskSink::new(&save_dir));
    let downloader = StreamingDownloader::new(reqwest::Client::new(), sink, "podcast.mp4");

    let (on_progress, seen) = collecting_progress();
    let saved = downloader
        .download_video(&file_url(&source), Some(on_progress))
        .await
        .unwrap();

    assert_eq!(saved, save_dir.join("podcast.mp4"));
    assert_eq!(std::fs::read(&saved).unwrap(), source_bytes);

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "progress regressed");
    assert_eq!(*seen.last().unwrap(), 100);
}

#[tokio::test]
async fn zero_length_source_reports_no_percentages() {
    let base = TempDir::new().unwrap();
    let source = base.path().join("empty.mp4");
    std::fs::write(&source, b"").unwrap();

    let sink = Arc::new(DiskSink::new(base.path().join("downloads")));
    let downloader = StreamingDownloader::new(reqwest::Client::new(), sink, "podcast.mp4");

    let (on_progress, seen) = collecting_progress();
    let saved = downloader
        .download_video(&file_url(&source), Some(on_progress))
        .await
        .unwrap();

    assert_eq!(std::fs::read(&saved).unwrap(), Vec::<u8>::new());
    // Unknown or zero total length never yields a misleading figure.
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unusable_save_dir_falls_back_to_temp() {
    let base = TempDir::new().unwrap();
    let source = base.path().join("episode.mp4");
    std::fs::write(&source, b"PAYLOAD").unwrap();

    // The configured "directory" is an existing regular file, so the
    // primary write cannot succeed.
    let blocked = base.path().join("blocked");
    std::fs::write(&blocked, b"in the way").unwrap();

    let sink = Arc::new(DiskSink::new(&blocked));
    let filename = "kpod-sink-fallback-test.mp4";
    let downloader = StreamingDownloader::new(reqwest::Client::new(), sink, filename);

    let saved = downloader
        .download_video(&file_url(&source), None)
        .await
        .unwrap();

    assert!(saved.starts_with(std::env::temp_dir()));
    assert_eq!(std::fs::read(&saved).unwrap(), b"PAYLOAD");
    let _ = std::fs::remove_file(saved);
}

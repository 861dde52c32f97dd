use chrono::{DateTime, Utc};
use hex::encode as hex_encode;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::mux::SubtitleSpec;

/// Final deliverable bytes tagged with a container content type. The
/// caller owns the buffer's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    bytes: Vec<u8>,
    content_type: String,
}

impl MediaBlob {
    pub fn video(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: "video/mp4".to_string(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn sha256_hex(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex_encode(hasher.finalize())
    }
}

/// Successful pipeline outcome: the assembled file plus what actually
/// made it in.
#[derive(Debug)]
pub struct ProcessedMedia {
    pub blob: MediaBlob,
    /// Subtitle specs that downloaded successfully and were embedded,
    /// in original relative order.
    pub embedded: Vec<SubtitleSpec>,
    /// True when no subtitles survived and the original video bytes
    /// were returned untouched.
    pub passthrough: bool,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub video_url: String,
    pub requested_subtitles: usize,
    pub embedded_subtitles: usize,
    pub passthrough: bool,
    pub output_bytes: usize,
    pub sha256: String,
    pub completed_at: DateTime<Utc>,
}

impl ProcessReport {
    pub fn new(video_url: impl Into<String>, requested: usize, media: &ProcessedMedia) -> Self {
        Self {
            video_url: video_url.into(),
            requested_subtitles: requested,
            embedded_subtitles: media.embedded.len(),
            passthrough: media.passthrough,
            output_bytes: media.blob.len(),
            sha256: media.blob.sha256_hex(),
            completed_at: media.completed_at,
        }
    }
}

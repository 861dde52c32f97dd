use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::EngineSection;

use super::error::{EngineError, EngineResult};
use super::{ProgressSender, TranscodeEngine};

/// Drives a system `ffmpeg` binary. The virtual working-storage
/// namespace is backed by a private temporary directory that ffmpeg
/// runs inside of, so command tokens reference bare file names.
pub struct FfmpegEngine {
    binary: String,
    log_level: String,
    workspace: TempDir,
    loaded: Mutex<bool>,
}

impl FfmpegEngine {
    pub fn new(section: &EngineSection) -> EngineResult<Self> {
        let workspace = TempDir::new().map_err(|source| EngineError::Io {
            path: std::env::temp_dir(),
            source,
        })?;
        Ok(Self {
            binary: section.ffmpeg_binary.clone(),
            log_level: section.log_level.clone(),
            workspace,
            loaded: Mutex::new(false),
        })
    }

    fn resolve_name(&self, name: &str) -> EngineResult<PathBuf> {
        // Names are flat identifiers inside the namespace, never paths.
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(EngineError::InvalidName(name.to_string()));
        }
        Ok(self.workspace.path().join(name))
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    async fn load(&self) -> EngineResult<()> {
        let mut loaded = self.loaded.lock().await;
        if *loaded {
            return Ok(());
        }
        let status = Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|err| EngineError::Load(format!("{}: {err}", self.binary)))?;
        if !status.success() {
            return Err(EngineError::Load(format!(
                "{} -version exited with {status}",
                self.binary
            )));
        }
        *loaded = true;
        Ok(())
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> EngineResult<()> {
        let path = self.resolve_name(name)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| EngineError::Io { path, source })
    }

    async fn read_file(&self, name: &str) -> EngineResult<Vec<u8>> {
        let path = self.resolve_name(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::MissingFile(name.to_string()))
            }
            Err(source) => Err(EngineError::Io { path, source }),
        }
    }

    async fn delete_file(&self, name: &str) -> EngineResult<()> {
        let path = self.resolve_name(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(EngineError::Io { path, source }),
        }
    }

    async fn exec(&self, command: &[String], progress: Option<ProgressSender>) -> EngineResult<()> {
        debug!(command = ?command, "executing ffmpeg");
        let mut child = Command::new(&self.binary)
            .current_dir(self.workspace.path())
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg(&self.log_level)
            .arg("-y")
            .args(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| EngineError::Exec(format!("failed to spawn {}: {err}", self.binary)))?;

        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Exec("ffmpeg stderr unavailable".to_string()))?;

        // Stats lines are carriage-return terminated, so split on both
        // \r and \n rather than using a line reader.
        let mut buf = [0u8; 4096];
        let mut pending: Vec<u8> = Vec::new();
        let mut duration: Option<f64> = None;
        let mut tail: Vec<String> = Vec::new();
        loop {
            let read = stderr
                .read(&mut buf)
                .await
                .map_err(|err| EngineError::Exec(err.to_string()))?;
            if read == 0 {
                break;
            }
            for &byte in &buf[..read] {
                if byte != b'\n' && byte != b'\r' {
                    pending.push(byte);
                    continue;
                }
                if pending.is_empty() {
                    continue;
                }
                let line = String::from_utf8_lossy(&pending).to_string();
                pending.clear();
                if duration.is_none() {
                    duration = extract_timestamp(&line, "Duration:");
                }
                if let (Some(total), Some(done)) = (duration, extract_timestamp(&line, "time=")) {
                    if total > 0.0 {
                        if let Some(sender) = &progress {
                            let _ = sender.send((done / total).clamp(0.0, 1.0)).await;
                        }
                    }
                }
                tail.push(line);
                if tail.len() > 12 {
                    tail.remove(0);
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|err| EngineError::Exec(err.to_string()))?;
        if !status.success() {
            return Err(EngineError::Exec(format!(
                "ffmpeg exited with {status}: {}",
                tail.join(" | ")
            )));
        }
        if let Some(sender) = &progress {
            let _ = sender.send(1.0).await;
        }
        Ok(())
    }
}

fn extract_timestamp(line: &str, key: &str) -> Option<f64> {
    let start = line.find(key)? + key.len();
    let rest = line[start..].trim_start();
    let token: String = rest
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != ',')
        .collect();
    parse_clock(&token)
}

fn parse_clock(token: &str) -> Option<f64> {
    let mut parts = token.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

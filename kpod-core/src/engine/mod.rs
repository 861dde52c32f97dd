mod error;
mod ffmpeg;

pub use error::{EngineError, EngineResult};
pub use ffmpeg::FfmpegEngine;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Per-invocation progress channel; payloads are completion ratios in
/// `[0, 1]`. Scoping the channel to one `exec` call means repeated
/// invocations never accumulate listeners on the engine.
pub type ProgressSender = mpsc::Sender<f64>;

/// Adapter over an embedded transcoding engine owning a flat virtual
/// working-storage namespace.
///
/// The engine instance is shared, stateful and not reentrancy-safe:
/// callers must not run two command executions with overlapping working
/// file names concurrently against the same instance.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Idempotent: a second call while already loaded is a no-op.
    async fn load(&self) -> EngineResult<()>;

    async fn write_file(&self, name: &str, bytes: &[u8]) -> EngineResult<()>;

    async fn read_file(&self, name: &str) -> EngineResult<Vec<u8>>;

    /// Deleting a name that does not exist is a no-op, not an error.
    async fn delete_file(&self, name: &str) -> EngineResult<()>;

    async fn exec(&self, command: &[String], progress: Option<ProgressSender>) -> EngineResult<()>;
}

mod error;
mod types;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MuxSection;
use crate::engine::{ProgressSender, TranscodeEngine};
use crate::fetch::ResourceFetcher;
use crate::mux::{
    build_remux_command, subtitle_working_name, SubtitleSpec, MUX_OUTPUT_NAME, VIDEO_INPUT_NAME,
};

pub use error::{PipelineError, PipelineFailure, PipelineResult, Stage};
pub use types::{MediaBlob, ProcessReport, ProcessedMedia};

/// Integer percent callback, 0..=100.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Sequences resolver output through fetch, optional mux and cleanup,
/// owning all failure and partial-failure policy. Invocations against
/// one engine instance are serialized internally: the engine's working
/// namespace is shared state and interleaved runs would corrupt it.
pub struct Pipeline<E> {
    engine: Arc<E>,
    fetcher: ResourceFetcher,
    mux_config: MuxSection,
    run_guard: Mutex<()>,
}

impl<E: TranscodeEngine> Pipeline<E> {
    pub fn new(engine: Arc<E>, fetcher: ResourceFetcher, mux_config: MuxSection) -> Self {
        Self {
            engine,
            fetcher,
            mux_config,
            run_guard: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Downloads the video and any reachable subtitles into engine
    /// storage, embeds the surviving subtitle tracks (or passes the
    /// video through untouched when none survive) and returns the
    /// assembled file. Every working file created by the invocation is
    /// deleted before this returns, on success and on failure alike.
    pub async fn process_video(
        &self,
        video_url: &str,
        subtitles: &[SubtitleSpec],
        on_progress: Option<ProgressFn>,
    ) -> PipelineResult<ProcessedMedia> {
        let _running = self.run_guard.lock().await;

        self.engine
            .load()
            .await
            .map_err(|err| PipelineError::at(Stage::EngineLoad, err))?;

        let (progress_tx, forwarder) = spawn_progress_forwarder(on_progress);

        let mut created: Vec<String> = Vec::new();
        let result = self
            .run_stages(video_url, subtitles, progress_tx, &mut created)
            .await;
        self.cleanup(&created).await;
        if let Some(handle) = forwarder {
            // All senders are gone by now, so the forwarder has drained.
            let _ = handle.await;
        }
        result
    }

    async fn run_stages(
        &self,
        video_url: &str,
        subtitles: &[SubtitleSpec],
        progress: Option<ProgressSender>,
        created: &mut Vec<String>,
    ) -> PipelineResult<ProcessedMedia> {
        info!(url = %video_url, "fetching video into working storage");
        created.push(VIDEO_INPUT_NAME.to_string());
        self.fetcher
            .fetch_into(&*self.engine, video_url, VIDEO_INPUT_NAME)
            .await
            .map_err(|err| PipelineError::at(Stage::FetchVideo, err))?;

        // Sequential fetches keep track-index assignment deterministic.
        let mut survivors: Vec<SubtitleSpec> = Vec::new();
        let mut sub_files: Vec<String> = Vec::new();
        for (index, spec) in subtitles.iter().enumerate() {
            let name = subtitle_working_name(index, spec);
            created.push(name.clone());
            match self.fetcher.fetch_into(&*self.engine, &spec.url, &name).await {
                Ok(()) => {
                    debug!(url = %spec.url, file = %name, "subtitle fetched");
                    sub_files.push(name);
                    survivors.push(spec.clone());
                }
                Err(err) => {
                    warn!(url = %spec.url, error = %err, "subtitle fetch failed, continuing without it");
                }
            }
        }

        let (output_name, passthrough) = if sub_files.is_empty() {
            info!("no subtitles to embed, passing original video through");
            (VIDEO_INPUT_NAME, true)
        } else {
            info!(tracks = sub_files.len(), "embedding subtitle tracks");
            let command = build_remux_command(&sub_files, &survivors, &self.mux_config);
            created.push(MUX_OUTPUT_NAME.to_string());
            self.engine
                .exec(&command, progress)
                .await
                .map_err(|err| PipelineError::at(Stage::Mux, err))?;
            (MUX_OUTPUT_NAME, false)
        };

        let bytes = self
            .engine
            .read_file(output_name)
            .await
            .map_err(|err| PipelineError::at(Stage::ReadOutput, err))?;

        Ok(ProcessedMedia {
            blob: MediaBlob::video(bytes),
            embedded: survivors,
            passthrough,
            completed_at: Utc::now(),
        })
    }

    /// Deletes every working file the invocation created. A file whose
    /// creation itself failed need not exist, so individual deletion
    /// errors are logged and ignored.
    async fn cleanup(&self, created: &[String]) {
        for name in created {
            if let Err(err) = self.engine.delete_file(name).await {
                warn!(file = %name, error = %err, "failed to delete working file");
            }
        }
    }
}

fn spawn_progress_forwarder(
    on_progress: Option<ProgressFn>,
) -> (Option<ProgressSender>, Option<JoinHandle<()>>) {
    let Some(callback) = on_progress else {
        return (None, None);
    };
    let (tx, mut rx) = mpsc::channel::<f64>(32);
    let handle = tokio::spawn(async move {
        while let Some(ratio) = rx.recv().await {
            let percent = (ratio.clamp(0.0, 1.0) * 100.0).round() as u8;
            callback(percent);
        }
    });
    (Some(tx), Some(handle))
}

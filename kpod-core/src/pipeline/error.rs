use std::fmt;

use thiserror::Error;

use crate::engine::EngineError;
use crate::fetch::DownloadError;

/// Pipeline phase at which an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    EngineLoad,
    FetchVideo,
    Mux,
    ReadOutput,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::EngineLoad => "engine load",
            Stage::FetchVideo => "video fetch",
            Stage::Mux => "mux",
            Stage::ReadOutput => "output read",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: PipelineFailure,
}

impl PipelineError {
    pub(crate) fn at(stage: Stage, source: impl Into<PipelineFailure>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineFailure {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Download(#[from] DownloadError),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

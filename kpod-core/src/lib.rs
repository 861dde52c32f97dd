pub mod captions;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod mux;
pub mod pipeline;
pub mod resolver;

pub use config::{
    load_kpod_config, DownloadSection, EngineSection, KpodConfig, MuxSection, ProviderSection,
};
pub use error::{ConfigError, Result};
pub use mux::{SubtitleSpec, MUX_OUTPUT_NAME, VIDEO_INPUT_NAME};
pub use pipeline::{
    MediaBlob, Pipeline, PipelineError, ProcessReport, ProcessedMedia, ProgressFn, Stage,
};
pub use resolver::{resolve, EndpointSet, ExtractionError, SessionInfo};

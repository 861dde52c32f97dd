use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transcode engine failed to initialize: {0}")]
    Load(String),
    #[error("working file {0} not found")]
    MissingFile(String),
    #[error("invalid working file name: {0}")]
    InvalidName(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("command execution failed: {0}")]
    Exec(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

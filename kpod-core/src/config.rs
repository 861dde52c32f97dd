use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ConfigError, Result};

pub const DEFAULT_PROVIDER_HOST: &str = "cdnapisec.kaltura.com";
pub const DEFAULT_RELAY_PREFIX: &str = "https://api.allorigins.win/raw?url=";
pub const DEFAULT_OUTPUT_FILENAME: &str = "podcast.mp4";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KpodConfig {
    pub provider: ProviderSection,
    pub engine: EngineSection,
    pub mux: MuxSection,
    pub download: DownloadSection,
}

impl KpodConfig {
    /// Loads the config file, or falls back to built-in defaults when it
    /// does not exist. Parse failures are still surfaced.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            load_kpod_config(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

impl Default for KpodConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSection {
                host: DEFAULT_PROVIDER_HOST.to_string(),
                relay_prefix: DEFAULT_RELAY_PREFIX.to_string(),
            },
            engine: EngineSection {
                ffmpeg_binary: "ffmpeg".to_string(),
                log_level: "info".to_string(),
            },
            mux: MuxSection {
                default_language: "eng".to_string(),
                subtitle_codec: "mov_text".to_string(),
            },
            download: DownloadSection {
                output_filename: DEFAULT_OUTPUT_FILENAME.to_string(),
                save_dir: "downloads".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSection {
    pub host: String,
    /// Prefix of the CORS relay; the original URL is appended url-encoded.
    pub relay_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    pub ffmpeg_binary: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MuxSection {
    pub default_language: String,
    pub subtitle_codec: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadSection {
    pub output_filename: String,
    pub save_dir: String,
}

pub fn load_kpod_config<P: AsRef<Path>>(path: P) -> Result<KpodConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

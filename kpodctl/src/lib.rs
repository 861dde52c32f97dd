use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;

use kpod_core::captions::{list_caption_assets, subtitle_specs, CaptionError};
use kpod_core::download::{DiskSink, FetchError, StreamingDownloader};
use kpod_core::engine::{EngineError, FfmpegEngine};
use kpod_core::fetch::ResourceFetcher;
use kpod_core::{
    resolve, EndpointSet, ExtractionError, KpodConfig, Pipeline, PipelineError, ProcessReport,
    ProgressFn, ProviderSection, SessionInfo, SubtitleSpec,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] kpod_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("caption error: {0}")]
    Caption(#[from] CaptionError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("download error: {0}")]
    Download(#[from] FetchError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Podcast media acquisition and remux tool", long_about = None)]
pub struct Cli {
    /// Path to the main kpod.toml
    #[arg(long, default_value = "configs/kpod.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve session identifiers and endpoints from saved page markup
    Resolve(ResolveArgs),
    /// List the caption assets a page advertises
    Captions(ResolveArgs),
    /// Download a video, embed its subtitles and save the result
    Process(ProcessArgs),
    /// Plain streaming download, no subtitle embedding
    Download(DownloadArgs),
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// File containing the saved page markup
    #[arg(long)]
    pub markup: PathBuf,
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// File containing the saved page markup
    #[arg(long)]
    pub markup: Option<PathBuf>,
    /// Video URL, overriding markup resolution
    #[arg(long)]
    pub url: Option<String>,
    /// Subtitle track as URL[,LANG[,LABEL]]; repeatable, order is kept
    #[arg(long = "subtitle")]
    pub subtitles: Vec<String>,
    /// Also embed every caption asset the page advertises
    #[arg(long, default_value_t = false)]
    pub auto_captions: bool,
    /// Output file path
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// File containing the saved page markup
    #[arg(long)]
    pub markup: Option<PathBuf>,
    /// Video URL, overriding markup resolution
    #[arg(long)]
    pub url: Option<String>,
    /// Output file path
    #[arg(long)]
    pub output: Option<PathBuf>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = KpodConfig::load_or_default(&cli.config)?;
    let client = reqwest::Client::new();

    match &cli.command {
        Commands::Resolve(args) => {
            let resolution = resolve_markup(&args.markup, &config.provider).await?;
            render(&EndpointReport::from(&resolution), cli.format)?;
        }
        Commands::Captions(args) => {
            let resolution = resolve_markup(&args.markup, &config.provider).await?;
            let listing_url = resolution.endpoints.subtitle_url.as_ref().ok_or_else(|| {
                AppError::MissingResource(
                    "caption listing needs a session token in the markup".to_string(),
                )
            })?;
            let fetcher = ResourceFetcher::new(client, &config.provider.relay_prefix);
            let assets = list_caption_assets(&fetcher, listing_url).await?;
            let rows = assets
                .iter()
                .map(|asset| CaptionRow {
                    id: asset.id.clone(),
                    language: asset.language_code.clone(),
                    label: asset.label.clone(),
                })
                .collect();
            render(&CaptionList { rows }, cli.format)?;
        }
        Commands::Process(args) => {
            let resolution = match &args.markup {
                Some(path) => Some(resolve_markup(path, &config.provider).await?),
                None => None,
            };
            let video_url = pick_video_url(args.url.as_deref(), resolution.as_ref())?;

            let mut specs = Vec::with_capacity(args.subtitles.len());
            for raw in &args.subtitles {
                specs.push(parse_subtitle_arg(raw)?);
            }
            if args.auto_captions {
                let resolution = resolution.as_ref().ok_or_else(|| {
                    AppError::InvalidArguments("--auto-captions requires --markup".to_string())
                })?;
                specs.extend(auto_caption_specs(&client, &config, resolution).await?);
            }

            let engine = Arc::new(FfmpegEngine::new(&config.engine)?);
            let fetcher = ResourceFetcher::new(client, &config.provider.relay_prefix);
            let pipeline = Pipeline::new(engine, fetcher, config.mux.clone());

            let requested = specs.len();
            let media = pipeline
                .process_video(&video_url, &specs, Some(stderr_progress()))
                .await?;
            finish_progress();

            let output = output_path(args.output.as_deref(), &config);
            write_output(&output, media.blob.as_bytes()).await?;

            let outcome = ProcessOutcome {
                saved_to: output.display().to_string(),
                report: ProcessReport::new(&video_url, requested, &media),
            };
            render(&outcome, cli.format)?;
        }
        Commands::Download(args) => {
            let resolution = match &args.markup {
                Some(path) => Some(resolve_markup(path, &config.provider).await?),
                None => None,
            };
            let video_url = pick_video_url(args.url.as_deref(), resolution.as_ref())?;

            let (dir, filename) = match &args.output {
                Some(path) => {
                    let dir = path
                        .parent()
                        .filter(|p| !p.as_os_str().is_empty())
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| PathBuf::from("."));
                    let filename = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .ok_or_else(|| {
                            AppError::InvalidArguments(format!(
                                "--output has no file name: {}",
                                path.display()
                            ))
                        })?
                        .to_string();
                    (dir, filename)
                }
                None => (
                    PathBuf::from(&config.download.save_dir),
                    config.download.output_filename.clone(),
                ),
            };

            let sink = Arc::new(DiskSink::new(dir));
            let downloader = StreamingDownloader::new(client, sink, filename);
            let saved = downloader
                .download_video(&video_url, Some(stderr_progress()))
                .await?;
            finish_progress();

            let bytes = tokio::fs::metadata(&saved).await?.len();
            render(
                &DownloadOutcome {
                    saved_to: saved.display().to_string(),
                    bytes,
                },
                cli.format,
            )?;
        }
    }

    Ok(())
}

/// Markup resolution plus the endpoints derived from it.
pub struct Resolution {
    pub info: SessionInfo,
    pub endpoints: EndpointSet,
}

async fn resolve_markup(path: &Path, provider: &ProviderSection) -> Result<Resolution> {
    let markup = tokio::fs::read_to_string(path).await?;
    let info = resolve(&markup)?;
    let endpoints = EndpointSet::build(&info, provider);
    Ok(Resolution { info, endpoints })
}

fn pick_video_url(url: Option<&str>, resolution: Option<&Resolution>) -> Result<String> {
    match (url, resolution) {
        (Some(url), _) => Ok(url.to_string()),
        (None, Some(resolution)) => Ok(resolution.endpoints.video_url.clone()),
        (None, None) => Err(AppError::InvalidArguments(
            "either --url or --markup is required".to_string(),
        )),
    }
}

/// Parses a `--subtitle URL[,LANG[,LABEL]]` argument.
fn parse_subtitle_arg(raw: &str) -> Result<SubtitleSpec> {
    let mut parts = raw.splitn(3, ',').map(str::trim);
    let url = parts.next().unwrap_or_default();
    if url.is_empty() {
        return Err(AppError::InvalidArguments(format!(
            "subtitle argument has no URL: {raw:?}"
        )));
    }
    let mut spec = SubtitleSpec::new(url);
    if let Some(language) = parts.next().filter(|s| !s.is_empty()) {
        spec = spec.with_language(language);
    }
    if let Some(label) = parts.next().filter(|s| !s.is_empty()) {
        spec = spec.with_label(label);
    }
    Ok(spec)
}

async fn auto_caption_specs(
    client: &reqwest::Client,
    config: &KpodConfig,
    resolution: &Resolution,
) -> Result<Vec<SubtitleSpec>> {
    let listing_url = resolution.endpoints.subtitle_url.as_ref().ok_or_else(|| {
        AppError::MissingResource(
            "caption listing needs a session token in the markup".to_string(),
        )
    })?;
    // subtitle_url is only built when the token is present.
    let token = resolution.info.session_token.as_deref().unwrap_or_default();
    let fetcher = ResourceFetcher::new(client.clone(), &config.provider.relay_prefix);
    let assets = list_caption_assets(&fetcher, listing_url).await?;
    Ok(subtitle_specs(&assets, &config.provider.host, token))
}

fn output_path(output: Option<&Path>, config: &KpodConfig) -> PathBuf {
    output.map(Path::to_path_buf).unwrap_or_else(|| {
        PathBuf::from(&config.download.save_dir).join(&config.download.output_filename)
    })
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

fn stderr_progress() -> ProgressFn {
    Arc::new(|percent| {
        eprint!("\rprogress: {percent:3}%");
    })
}

fn finish_progress() {
    eprintln!();
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
pub struct EndpointReport {
    pub entry_id: String,
    pub account_id: String,
    pub has_session_token: bool,
    pub video_url: String,
    pub subtitle_url: Option<String>,
}

impl From<&Resolution> for EndpointReport {
    fn from(resolution: &Resolution) -> Self {
        Self {
            entry_id: resolution.info.entry_id.clone(),
            account_id: resolution.info.account_id.clone(),
            has_session_token: resolution.info.session_token.is_some(),
            video_url: resolution.endpoints.video_url.clone(),
            subtitle_url: resolution.endpoints.subtitle_url.clone(),
        }
    }
}

impl DisplayFallback for EndpointReport {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("Entry: {}", self.entry_id),
            format!("Account: {}", self.account_id),
            format!("Session token: {}", if self.has_session_token { "present" } else { "absent" }),
            format!("Video: {}", self.video_url),
        ];
        match &self.subtitle_url {
            Some(url) => lines.push(format!("Captions: {url}")),
            None => lines.push("Captions: unavailable".to_string()),
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct CaptionList {
    pub rows: Vec<CaptionRow>,
}

#[derive(Debug, Serialize)]
pub struct CaptionRow {
    pub id: String,
    pub language: Option<String>,
    pub label: Option<String>,
}

impl DisplayFallback for CaptionList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No caption assets advertised".to_string();
        }
        let mut lines = Vec::new();
        for row in &self.rows {
            lines.push(format!(
                "{} | lang={} | {}",
                row.id,
                row.language.as_deref().unwrap_or("-"),
                row.label.as_deref().unwrap_or("<untitled>"),
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ProcessOutcome {
    pub saved_to: String,
    #[serde(flatten)]
    pub report: ProcessReport,
}

impl DisplayFallback for ProcessOutcome {
    fn display(&self) -> String {
        let mode = if self.report.passthrough {
            "passthrough (no subtitles embedded)"
        } else {
            "remuxed"
        };
        [
            format!("Saved: {}", self.saved_to),
            format!("Mode: {mode}"),
            format!(
                "Subtitles: {}/{} embedded",
                self.report.embedded_subtitles, self.report.requested_subtitles
            ),
            format!("Size: {} bytes", self.report.output_bytes),
            format!("SHA-256: {}", self.report.sha256),
        ]
        .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct DownloadOutcome {
    pub saved_to: String,
    pub bytes: u64,
}

impl DisplayFallback for DownloadOutcome {
    fn display(&self) -> String {
        format!("Saved: {} ({} bytes)", self.saved_to, self.bytes)
    }
}

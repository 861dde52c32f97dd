use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::fetch::{DownloadError, ResourceFetcher};
use crate::mux::SubtitleSpec;

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("caption listing request failed: {0}")]
    Listing(#[from] DownloadError),
    #[error("caption listing malformed: {0}")]
    Malformed(String),
}

pub type CaptionResult<T> = std::result::Result<T, CaptionError>;

/// One caption asset as returned by the provider's
/// `caption_captionasset` list action.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptionAsset {
    pub id: String,
    #[serde(default, rename = "languageCode")]
    pub language_code: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "fileExt")]
    pub file_ext: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaptionListResponse {
    #[serde(default)]
    objects: Vec<CaptionAsset>,
}

pub fn parse_caption_listing(body: &str) -> CaptionResult<Vec<CaptionAsset>> {
    let response: CaptionListResponse =
        serde_json::from_str(body).map_err(|err| CaptionError::Malformed(err.to_string()))?;
    Ok(response.objects)
}

/// Fetches the caption-listing endpoint and returns its assets in
/// listing order.
pub async fn list_caption_assets(
    fetcher: &ResourceFetcher,
    listing_url: &str,
) -> CaptionResult<Vec<CaptionAsset>> {
    let bytes = fetcher.fetch_bytes(listing_url).await?;
    let body = String::from_utf8_lossy(&bytes);
    let assets = parse_caption_listing(&body)?;
    debug!(count = assets.len(), "caption listing resolved");
    Ok(assets)
}

/// Serve-action URL for an individual caption asset.
pub fn caption_serve_url(host: &str, asset_id: &str, session_token: &str) -> String {
    format!(
        "https://{host}/api_v3/index.php?service=caption_captionasset&action=serve&captionAssetId={asset_id}&ks={session_token}"
    )
}

/// Maps listed caption assets onto the subtitle specs the mux pipeline
/// consumes, preserving listing order.
pub fn subtitle_specs(assets: &[CaptionAsset], host: &str, session_token: &str) -> Vec<SubtitleSpec> {
    assets
        .iter()
        .enumerate()
        .map(|(index, asset)| {
            let extension = asset.file_ext.clone().unwrap_or_else(|| "srt".to_string());
            SubtitleSpec {
                url: caption_serve_url(host, &asset.id, session_token),
                language: asset.language_code.clone(),
                label: asset.label.clone(),
                file_name: Some(format!("sub_{index}.{extension}")),
            }
        })
        .collect()
}

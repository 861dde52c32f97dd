use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::config::ProviderSection;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("required session fields missing from markup: {}", missing.join(", "))]
    MissingFields { missing: Vec<String> },
    #[error("invalid extraction pattern for {name}: {source}")]
    Pattern {
        name: &'static str,
        source: regex::Error,
    },
}

pub type ResolverResult<T> = std::result::Result<T, ExtractionError>;

/// Session identifiers scraped from a podcast page. `entry_id` and
/// `account_id` are both present or construction fails as a whole;
/// the session token alone never fails resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub entry_id: String,
    pub account_id: String,
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSet {
    pub video_url: String,
    /// Caption-listing API endpoint; present iff the session token was.
    pub subtitle_url: Option<String>,
}

struct FieldDescriptor {
    name: &'static str,
    pattern: &'static str,
    required: bool,
}

const FIELD_SCHEMA: [FieldDescriptor; 3] = [
    FieldDescriptor {
        name: "entry_id",
        pattern: r#"entry_id['":\s=]+([A-Za-z0-9_-]+)"#,
        required: true,
    },
    FieldDescriptor {
        name: "account_id",
        pattern: r"/p/(\d+)/",
        required: true,
    },
    FieldDescriptor {
        name: "session_token",
        pattern: r#"ks['":\s=]+([A-Za-z0-9_-]+)"#,
        required: false,
    },
];

fn capture(markup: &str, field: &FieldDescriptor) -> ResolverResult<Option<String>> {
    let regex = Regex::new(field.pattern).map_err(|source| ExtractionError::Pattern {
        name: field.name,
        source,
    })?;
    Ok(regex
        .captures(markup)
        .and_then(|captures| captures.get(1))
        .map(|group| group.as_str().to_string()))
}

/// Extracts session identifiers from raw page markup. Pure and
/// deterministic; the error names every missing required field, not
/// just the first.
pub fn resolve(markup: &str) -> ResolverResult<SessionInfo> {
    let mut values = Vec::with_capacity(FIELD_SCHEMA.len());
    let mut missing = Vec::new();
    for field in &FIELD_SCHEMA {
        let value = capture(markup, field)?;
        if field.required && value.is_none() {
            missing.push(field.name.to_string());
        }
        values.push(value);
    }
    let mut values = values.into_iter();
    let entry_id = values.next().flatten();
    let account_id = values.next().flatten();
    let session_token = values.next().flatten();
    match (entry_id, account_id) {
        (Some(entry_id), Some(account_id)) => Ok(SessionInfo {
            entry_id,
            account_id,
            session_token,
        }),
        _ => Err(ExtractionError::MissingFields { missing }),
    }
}

impl EndpointSet {
    /// Builds the provider endpoints for a resolved session. The account
    /// id is doubled with a `00` suffix in the `sp` path segment per the
    /// provider's partition convention.
    pub fn build(info: &SessionInfo, provider: &ProviderSection) -> Self {
        let mut video_url = format!(
            "https://{host}/p/{account}/sp/{account}00/playManifest/entryId/{entry}/format/download/protocol/https",
            host = provider.host,
            account = info.account_id,
            entry = info.entry_id,
        );
        if let Some(token) = &info.session_token {
            video_url.push_str("/ks/");
            video_url.push_str(token);
        }

        let subtitle_url = match &info.session_token {
            Some(token) => Some(format!(
                "https://{host}/api_v3/index.php?service=caption_captionasset&apiVersion=3.1&expiry=86400&clientTag=kwidget:v2.101&format=1&ignoreNull=1&action=list&filter:objectType=KalturaAssetFilter&filter:entryIdEqual={entry}&filter:statusEqual=2&pager:pageSize=50&ks={token}",
                host = provider.host,
                entry = info.entry_id,
            )),
            None => {
                warn!(
                    entry_id = %info.entry_id,
                    "no session token in markup; caption listing endpoint unavailable"
                );
                None
            }
        };

        Self {
            video_url,
            subtitle_url,
        }
    }
}

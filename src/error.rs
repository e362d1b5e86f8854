use thiserror::Error;

use crate::storage::db::StoreError;

/// Failure taxonomy shared by resolution, proxying, caching and downloads.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// DNS, connect, TLS or timeout failure, or a transport-level HTTP error.
    #[error("network failure: {0}")]
    Network(String),

    /// An anti-bot verification page was served instead of content.
    #[error("challenge page detected from {platform}")]
    ChallengeDetected { platform: String },

    /// The platform answered, but not in a shape we know how to read.
    #[error("unexpected response from {platform}: {detail}")]
    SchemaMismatch { platform: String, detail: String },

    /// The platform answered correctly and says there is no media.
    #[error("no media found: {0}")]
    NotFound(String),

    #[error("asset proxy failed for {url}: {detail}")]
    AssetProxy { url: String, detail: String },

    #[error("download failed: {0}")]
    Download(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl ResolveError {
    pub fn schema(platform: impl ToString, detail: impl Into<String>) -> Self {
        ResolveError::SchemaMismatch {
            platform: platform.to_string(),
            detail: detail.into(),
        }
    }

    pub fn challenge(platform: impl ToString) -> Self {
        ResolveError::ChallengeDetected {
            platform: platform.to_string(),
        }
    }

    /// Stable machine-readable name of the variant, used at the boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::UnsupportedPlatform(_) => "UnsupportedPlatform",
            ResolveError::Network(_) => "NetworkFailure",
            ResolveError::ChallengeDetected { .. } => "ChallengeDetected",
            ResolveError::SchemaMismatch { .. } => "SchemaMismatch",
            ResolveError::NotFound(_) => "NotFound",
            ResolveError::AssetProxy { .. } => "AssetProxyFailure",
            ResolveError::Download(_) => "DownloadFailure",
            ResolveError::Persistence(_) => "PersistenceError",
        }
    }
}

impl From<reqwest::Error> for ResolveError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            let host = e
                .url()
                .and_then(|u| u.host_str())
                .unwrap_or("unknown")
                .to_string();
            return ResolveError::schema(host, e.to_string());
        }
        ResolveError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for ResolveError {
    fn from(e: serde_json::Error) -> Self {
        ResolveError::schema("json", e.to_string())
    }
}

impl From<std::io::Error> for ResolveError {
    fn from(e: std::io::Error) -> Self {
        ResolveError::Download(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;

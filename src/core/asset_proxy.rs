use base64::Engine;
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, REFERER};

use vidlink_core::models::settings::{AssetProxySettings, NetworkSettings};
use vidlink_core::platforms::Platform;

use crate::core::http_client::{self, DESKTOP_USER_AGENT};
use crate::error::{ResolveError, Result};

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// Fetches hotlink-protected assets server-side and inlines them as data URIs.
pub struct AssetProxy {
    client: reqwest::Client,
    max_bytes: u64,
}

impl AssetProxy {
    pub fn new(net: &NetworkSettings, settings: &AssetProxySettings) -> Result<Self> {
        Ok(Self {
            client: http_client::build(http_client::client_builder(net).user_agent(DESKTOP_USER_AGENT))?,
            max_bytes: settings.max_bytes,
        })
    }

    /// Referer chosen from the asset's CDN host, then from its share host.
    pub fn referer_for(url: &str) -> Option<&'static str> {
        Platform::from_asset_url(url)
            .or_else(|| Platform::from_url(url))
            .map(|p| p.referer())
    }

    pub async fn proxy(&self, url: &str) -> Result<String> {
        self.fetch(url, Self::referer_for(url)).await
    }

    pub async fn proxy_with_referer(&self, url: &str, referer: &str) -> Result<String> {
        self.fetch(url, Some(referer)).await
    }

    /// One result per input, in input order. A failed asset never fails its siblings.
    pub async fn proxy_many(&self, urls: &[String]) -> Vec<Result<String>> {
        futures::future::join_all(urls.iter().map(|u| self.proxy(u))).await
    }

    async fn fetch(&self, url: &str, referer: Option<&str>) -> Result<String> {
        let fail = |detail: String| ResolveError::AssetProxy {
            url: url.to_string(),
            detail,
        };

        let parsed = url::Url::parse(url).map_err(|e| fail(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(fail(format!("unsupported scheme {}", parsed.scheme())));
        }

        let mut request = self.client.get(parsed);
        if let Some(r) = referer {
            request = request.header(REFERER, r);
        }
        let response = request.send().await.map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status)));
        }
        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(fail(format!("{} bytes exceeds limit of {}", len, self.max_bytes)));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| fail(e.to_string()))?;
            if body.len() as u64 + chunk.len() as u64 > self.max_bytes {
                return Err(fail(format!("body exceeds limit of {} bytes", self.max_bytes)));
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!("[asset] {} ({} bytes, {})", url, body.len(), content_type);
        Ok(format!(
            "data:{};base64,{}",
            content_type,
            base64::engine::general_purpose::STANDARD.encode(&body)
        ))
    }
}

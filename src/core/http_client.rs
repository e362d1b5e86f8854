use std::sync::LazyLock;
use std::sync::RwLock;
use std::time::Duration;

use vidlink_core::models::settings::{NetworkSettings, ProxySettings};

use crate::error::{ResolveError, Result};

pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1";

static GLOBAL_PROXY: LazyLock<RwLock<ProxySettings>> =
    LazyLock::new(|| RwLock::new(ProxySettings::default()));

pub fn init_proxy(proxy: ProxySettings) {
    if let Ok(mut guard) = GLOBAL_PROXY.write() {
        *guard = proxy;
    }
}

pub fn get_proxy_snapshot() -> ProxySettings {
    GLOBAL_PROXY
        .read()
        .map(|g| g.clone())
        .unwrap_or_default()
}

pub fn proxy_url(proxy: &ProxySettings) -> Option<String> {
    if !proxy.enabled || proxy.host.is_empty() {
        return None;
    }
    let scheme = match proxy.proxy_type.as_str() {
        "socks5" => "socks5",
        "https" => "https",
        _ => "http",
    };
    if !proxy.username.is_empty() {
        Some(format!(
            "{}://{}:{}@{}:{}",
            scheme, proxy.username, proxy.password, proxy.host, proxy.port
        ))
    } else {
        Some(format!("{}://{}:{}", scheme, proxy.host, proxy.port))
    }
}

pub fn apply_proxy(
    builder: reqwest::ClientBuilder,
    proxy: &ProxySettings,
) -> reqwest::ClientBuilder {
    let Some(url) = proxy_url(proxy) else {
        return builder;
    };
    match reqwest::Proxy::all(&url) {
        Ok(p) => builder.proxy(p),
        Err(e) => {
            tracing::warn!("Invalid proxy URL: {}", e);
            builder
        }
    }
}

pub fn apply_global_proxy(builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
    let proxy = get_proxy_snapshot();
    apply_proxy(builder, &proxy)
}

/// Builder with connect/request timeouts and a bounded redirect policy.
pub fn client_builder(net: &NetworkSettings) -> reqwest::ClientBuilder {
    let builder = reqwest::Client::builder()
        .connect_timeout(net.connect_timeout())
        .timeout(net.request_timeout())
        .redirect(reqwest::redirect::Policy::limited(net.max_redirects));
    apply_global_proxy(builder)
}

/// Builder that never follows redirects, for reading `Location` headers.
pub fn no_redirect_builder(net: &NetworkSettings) -> reqwest::ClientBuilder {
    client_builder(net).redirect(reqwest::redirect::Policy::none())
}

/// Builder for long-lived body streams: no total deadline. Callers bound the
/// wait for headers with [`send_within`] and the gap between chunks themselves.
pub fn streaming_builder(net: &NetworkSettings) -> reqwest::ClientBuilder {
    let builder = reqwest::Client::builder()
        .connect_timeout(net.connect_timeout())
        .redirect(reqwest::redirect::Policy::limited(net.max_redirects));
    apply_global_proxy(builder)
}

/// Sends `request`, failing with `NetworkFailure` when no response head
/// arrives within `limit`.
pub async fn send_within(
    request: reqwest::RequestBuilder,
    limit: Duration,
) -> Result<reqwest::Response> {
    match tokio::time::timeout(limit, request.send()).await {
        Ok(response) => Ok(response?),
        Err(_) => Err(ResolveError::Network(format!(
            "no response within {}s",
            limit.as_secs()
        ))),
    }
}

pub fn build(builder: reqwest::ClientBuilder) -> Result<reqwest::Client> {
    builder
        .build()
        .map_err(|e| ResolveError::Network(format!("failed to build HTTP client: {}", e)))
}

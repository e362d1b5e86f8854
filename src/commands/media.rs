use super::to_message;
use crate::AppState;

pub async fn proxy_image(
    state: &AppState,
    url: String,
    referer: Option<String>,
) -> Result<String, String> {
    let result = match referer.as_deref().filter(|r| !r.is_empty()) {
        Some(referer) => state.asset_proxy.proxy_with_referer(&url, referer).await,
        None => state.asset_proxy.proxy(&url).await,
    };
    result.map_err(to_message)
}

/// Per-item outcome, in input order.
pub async fn proxy_images(state: &AppState, urls: Vec<String>) -> Vec<Result<String, String>> {
    state
        .asset_proxy
        .proxy_many(&urls)
        .await
        .into_iter()
        .map(|r| r.map_err(to_message))
        .collect()
}

pub async fn cache_video(state: &AppState, url: String) -> Result<String, String> {
    state
        .video_cache
        .cache(&url)
        .await
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(to_message)
}

use serde::Serialize;

use vidlink_core::models::media::MediaDescriptor;
use vidlink_core::platforms::Platform;

use super::to_message;
use crate::AppState;

#[derive(Clone, Serialize)]
pub struct PlatformInfo {
    pub platform: String,
    pub supported: bool,
}

pub async fn parse_video(state: &AppState, url: String) -> Result<MediaDescriptor, String> {
    state.registry.resolve(&url).await.map_err(to_message)
}

pub fn detect_platform(url: String) -> Result<PlatformInfo, String> {
    let url = crate::platforms::shared::extract_url(&url).unwrap_or(url);
    Ok(match Platform::from_url(&url) {
        Some(platform) => PlatformInfo {
            platform: platform.to_string(),
            supported: true,
        },
        None => PlatformInfo {
            platform: "unknown".to_string(),
            supported: false,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support;

    #[test]
    fn detects_from_share_text() {
        let info = detect_platform("复制打开抖音 https://v.douyin.com/iAbCdEf/ 看看".into()).unwrap();
        assert!(info.supported);
        assert_eq!(info.platform, "douyin");

        let info = detect_platform("https://vimeo.com/1".into()).unwrap();
        assert!(!info.supported);
    }

    #[tokio::test]
    async fn unsupported_url_names_the_kind() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path());
        let err = parse_video(&state, "https://example.com/v/1".into()).await.unwrap_err();
        assert!(err.starts_with("UnsupportedPlatform:"), "{}", err);
    }
}

use vidlink_core::models::media::MediaDescriptor;
use vidlink_core::models::settings::NetworkSettings;

use crate::core::normalizer;
use crate::error::{ResolveError, Result};
use crate::platforms::bilibili::BilibiliResolver;
use crate::platforms::douyin::DouyinResolver;
use crate::platforms::kuaishou::KuaishouResolver;
use crate::platforms::pipixia::PipixiaResolver;
use crate::platforms::shared;
use crate::platforms::traits::PlatformResolver;
use crate::platforms::weibo::WeiboResolver;
use crate::platforms::xhs::XhsResolver;
use crate::platforms::xigua::XiguaResolver;

pub struct PlatformRegistry {
    platforms: Vec<Box<dyn PlatformResolver>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self {
            platforms: Vec::new(),
        }
    }

    /// Every built-in resolver, in dispatch order.
    pub fn with_default_platforms(net: &NetworkSettings) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Box::new(DouyinResolver::new(net)?));
        registry.register(Box::new(KuaishouResolver::new(net)?));
        registry.register(Box::new(XhsResolver::new(net)?));
        registry.register(Box::new(WeiboResolver::new(net)?));
        registry.register(Box::new(BilibiliResolver::new(net)?));
        registry.register(Box::new(PipixiaResolver::new(net)?));
        registry.register(Box::new(XiguaResolver::new(net)?));
        Ok(registry)
    }

    pub fn register(&mut self, platform: Box<dyn PlatformResolver>) {
        self.platforms.push(platform);
    }

    pub fn find_platform(&self, url: &str) -> Option<&dyn PlatformResolver> {
        self.platforms
            .iter()
            .find(|p| p.can_handle(url))
            .map(|p| p.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.platforms.iter().map(|p| p.name()).collect()
    }

    /// Share text or URL in, canonical descriptor out.
    pub async fn resolve(&self, input: &str) -> Result<MediaDescriptor> {
        let url = shared::extract_url(input).unwrap_or_else(|| input.trim().to_string());

        let resolver = self
            .find_platform(&url)
            .ok_or_else(|| ResolveError::UnsupportedPlatform(url.clone()))?;
        tracing::info!("[resolve] {} via {}", url, resolver.name());

        let raw = resolver.resolve(&url).await.inspect_err(|e| {
            tracing::warn!("[resolve] {} failed ({}): {}", resolver.name(), e.kind(), e);
        })?;
        normalizer::normalize(raw)
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vidlink_core::models::media::ImageRef;
    use vidlink_core::platforms::Platform;

    use crate::models::raw::RawMedia;

    struct Fixed(Platform);

    #[async_trait]
    impl PlatformResolver for Fixed {
        fn platform(&self) -> Platform {
            self.0
        }

        async fn resolve(&self, _url: &str) -> Result<RawMedia> {
            let mut raw = RawMedia::new(self.0);
            raw.images = vec![ImageRef::new("https://cdn.example.com/1.jpg")];
            Ok(raw)
        }
    }

    #[test]
    fn default_order() {
        let registry = PlatformRegistry::with_default_platforms(&NetworkSettings::default()).unwrap();
        assert_eq!(
            registry.names(),
            vec!["douyin", "kuaishou", "xhs", "weibo", "bilibili", "pipixia", "xigua"]
        );
    }

    #[test]
    fn finds_by_host() {
        let registry = PlatformRegistry::with_default_platforms(&NetworkSettings::default()).unwrap();
        let found = registry.find_platform("https://b23.tv/xyz").map(|p| p.platform());
        assert_eq!(found, Some(Platform::Bilibili));
        assert!(registry.find_platform("https://www.youtube.com/watch?v=x").is_none());
    }

    #[tokio::test]
    async fn unsupported_url() {
        let registry = PlatformRegistry::new();
        let err = registry.resolve("https://example.com/video/1").await.unwrap_err();
        assert_eq!(err.kind(), "UnsupportedPlatform");
    }

    #[tokio::test]
    async fn share_text_is_unwrapped_and_normalized() {
        let mut registry = PlatformRegistry::new();
        registry.register(Box::new(Fixed(Platform::Xhs)));
        let d = registry
            .resolve("看看这篇笔记 http://xhslink.com/a/AbC123，复制后打开")
            .await
            .unwrap();
        assert_eq!(d.platform, Platform::Xhs);
        assert_eq!(d.images.len(), 1);
    }
}

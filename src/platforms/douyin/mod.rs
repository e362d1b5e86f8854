use async_trait::async_trait;
use rand::RngExt;
use scraper::{Html, Selector};
use serde_json::Value;

use vidlink_core::models::media::{Author, ImageRef};
use vidlink_core::models::settings::NetworkSettings;
use vidlink_core::platforms::Platform;

use crate::core::http_client::{self, MOBILE_USER_AGENT};
use crate::core::redirect;
use crate::error::{ResolveError, Result};
use crate::models::raw::{RawMedia, RawQuality};
use crate::platforms::shared::{self, first_non_webp, str_at, string_at, u64_at};
use crate::platforms::traits::PlatformResolver;

const ROUTER_DATA: &str = "window._ROUTER_DATA";

pub struct DouyinResolver {
    client: reqwest::Client,
    no_redirect: reqwest::Client,
}

impl DouyinResolver {
    pub fn new(net: &NetworkSettings) -> Result<Self> {
        Ok(Self {
            client: http_client::build(http_client::client_builder(net).user_agent(MOBILE_USER_AGENT))?,
            no_redirect: http_client::build(
                http_client::no_redirect_builder(net).user_agent(MOBILE_USER_AGENT),
            )?,
        })
    }

    /// `modal_id` query parameter if present, else the last path segment.
    fn extract_item_id(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "modal_id") {
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
        parsed
            .path_segments()?
            .filter(|s| !s.is_empty())
            .last()
            .filter(|s| s.chars().all(|c| c.is_ascii_digit()))
            .map(|s| s.to_string())
    }

    /// Finds `loaderData.<video_|note_...>/page.videoInfoRes` in the page.
    ///
    /// `Ok(None)` means the page data is there but lists no item.
    pub fn parse_router_data(html: &str) -> Result<Option<Value>> {
        let json = shared::embedded_json(html, ROUTER_DATA)
            .ok_or_else(|| shared::missing_payload(Platform::Douyin, html, &[]))?;
        let data: Value = serde_json::from_str(json)
            .map_err(|e| ResolveError::schema(Platform::Douyin, format!("router data: {}", e)))?;

        let loader = data
            .get("loaderData")
            .and_then(|v| v.as_object())
            .ok_or_else(|| ResolveError::schema(Platform::Douyin, "router data without loaderData"))?;

        let page = loader.iter().find(|(key, value)| {
            (key.starts_with("video_") || key.starts_with("note_"))
                && key.contains("/page")
                && value.get("videoInfoRes").is_some()
        });

        let Some((key, page)) = page else {
            return Err(ResolveError::schema(Platform::Douyin, "no video/note page in loaderData"));
        };
        tracing::debug!("Douyin: using loaderData entry {}", key);

        Ok(page
            .pointer("/videoInfoRes/item_list/0")
            .filter(|v| v.is_object())
            .cloned())
    }

    fn canonical_link(html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let selector = Selector::parse("link[rel='canonical']").ok()?;
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(|s| s.to_string())
    }

    fn random_web_id() -> String {
        let digits: String = (0..15)
            .map(|_| char::from(b'0' + rand::rng().random_range(0..10u8)))
            .collect();
        format!("75{}", digits)
    }

    fn random_token(len: usize) -> String {
        let chars: Vec<char> = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ"
            .chars()
            .collect();
        (0..len)
            .map(|_| chars[rand::rng().random_range(0..chars.len())])
            .collect()
    }

    async fn fetch_note_details(&self, item_id: &str) -> Result<Option<Value>> {
        let web_id = Self::random_web_id();
        let api_url = format!(
            "https://www.douyin.com/web/api/v2/aweme/slidesinfo/?reflow_source=reflow_page&web_id={web}&device_id={web}&aweme_ids=%5B{id}%5D&request_source=200&a_bogus={bogus}",
            web = web_id,
            id = item_id,
            bogus = Self::random_token(64),
        );
        tracing::debug!("Douyin: note fallback via slidesinfo for {}", item_id);

        let response = self.client.get(&api_url).send().await?;
        shared::check_api_status(Platform::Douyin, response.status())?;
        let body = response.text().await?;
        let data = shared::parse_json(Platform::Douyin, &body)?;
        Ok(data.pointer("/aweme_details/0").filter(|v| v.is_object()).cloned())
    }

    /// Maps one aweme item. Gallery notes carry no video even when the
    /// item has a background clip.
    pub fn item_to_raw(item: &Value) -> RawMedia {
        let mut raw = RawMedia::new(Platform::Douyin);
        raw.title = string_at(item, "/desc");
        raw.author = Author {
            uid: str_at(item, "/author/sec_uid")
                .map(|s| s.to_string())
                .unwrap_or_else(|| string_at(item, "/author/uid")),
            name: string_at(item, "/author/nickname"),
            avatar_url: string_at(item, "/author/avatar_thumb/url_list/0"),
        };
        raw.cover_url = first_non_webp(item.pointer("/video/cover/url_list"))
            .or_else(|| first_non_webp(item.pointer("/video/origin_cover/url_list")))
            .unwrap_or_default();
        raw.music_url = str_at(item, "/music/play_url/url_list/0").map(|s| s.to_string());

        if let Some(images) = item.get("images").and_then(|v| v.as_array()) {
            raw.images = images
                .iter()
                .filter_map(|img| {
                    let url = first_non_webp(img.get("url_list"))?;
                    Some(ImageRef {
                        url,
                        live_photo_url: str_at(img, "/video/play_addr/url_list/0")
                            .map(|s| s.to_string()),
                    })
                })
                .collect();
        }
        if !raw.images.is_empty() {
            if raw.cover_url.is_empty() {
                raw.cover_url = raw.images[0].url.clone();
            }
            return raw;
        }

        raw.video_url = str_at(item, "/video/play_addr/url_list/0").map(Self::strip_watermark);
        if let Some(rates) = item.pointer("/video/bit_rate").and_then(|v| v.as_array()) {
            raw.qualities = rates
                .iter()
                .filter_map(|br| {
                    let url = str_at(br, "/play_addr/url_list/0")?;
                    let label = str_at(br, "/gear_name").unwrap_or("unknown");
                    Some(
                        RawQuality::new(label, Self::strip_watermark(url), u64_at(br, "/bit_rate").unwrap_or(0))
                            .with_size(u64_at(br, "/play_addr/data_size")),
                    )
                })
                .collect();
        }
        raw
    }

    fn strip_watermark(url: &str) -> String {
        url.replace("playwm", "play")
    }

    /// Play URLs are 302s onto a CDN node; pin one hop, keeping the
    /// original on any failure.
    async fn pin_cdn(&self, url: String) -> String {
        match redirect::resolve_redirect(&self.no_redirect, &url, MOBILE_USER_AGENT).await {
            Ok(Some(location)) => location,
            Ok(None) => url,
            Err(e) => {
                tracing::debug!("Douyin: keeping unpinned play url: {}", e);
                url
            }
        }
    }
}

#[async_trait]
impl PlatformResolver for DouyinResolver {
    fn platform(&self) -> Platform {
        Platform::Douyin
    }

    async fn resolve(&self, url: &str) -> Result<RawMedia> {
        let mut target = url.to_string();
        if Self::extract_item_id(&target).is_none() {
            if let Some(location) =
                redirect::resolve_redirect(&self.no_redirect, &target, MOBILE_USER_AGENT).await?
            {
                tracing::debug!("Douyin: short link {} -> {}", target, location);
                target = location;
            }
        }

        let item_id = Self::extract_item_id(&target).ok_or_else(|| {
            ResolveError::schema(Platform::Douyin, format!("no item id in {}", target))
        })?;

        let page_url = format!("https://www.iesdouyin.com/share/video/{}/", item_id);
        tracing::debug!("Douyin: fetching {}", page_url);
        let response = self.client.get(&page_url).send().await?;
        if !response.status().is_success() {
            return Err(ResolveError::schema(
                Platform::Douyin,
                format!("share page HTTP {}", response.status()),
            ));
        }
        let html = response.text().await?;

        let item = match Self::parse_router_data(&html) {
            Ok(Some(item)) => item,
            Ok(None) => {
                return Err(ResolveError::NotFound(format!("douyin item {} is unavailable", item_id)));
            }
            Err(e @ ResolveError::ChallengeDetected { .. }) => return Err(e),
            Err(e) => {
                let is_note = Self::canonical_link(&html).is_some_and(|c| c.contains("/note/"));
                if !is_note {
                    return Err(e);
                }
                self.fetch_note_details(&item_id)
                    .await?
                    .ok_or_else(|| ResolveError::NotFound(format!("douyin note {} is unavailable", item_id)))?
            }
        };

        let mut raw = Self::item_to_raw(&item);

        if let Some(video_url) = raw.video_url.take() {
            raw.video_url = Some(self.pin_cdn(video_url).await);
        }
        let pinned = futures::future::join_all(
            raw.qualities
                .iter()
                .map(|q| self.pin_cdn(q.url.clone())),
        )
        .await;
        for (quality, url) in raw.qualities.iter_mut().zip(pinned) {
            quality.url = url;
        }

        Ok(raw)
    }
}

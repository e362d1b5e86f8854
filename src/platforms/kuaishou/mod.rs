use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use serde_json::Value;

use vidlink_core::models::media::{Author, ImageRef};
use vidlink_core::models::settings::NetworkSettings;
use vidlink_core::platforms::Platform;

use crate::core::http_client;
use crate::core::redirect;
use crate::error::{ResolveError, Result};
use crate::models::raw::{RawMedia, RawQuality};
use crate::platforms::shared::{self, str_at, string_at, u64_at};
use crate::platforms::traits::PlatformResolver;

const USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
const INIT_STATE: &str = "window.INIT_STATE";
const COOKIE_VALUE: &str = "did=web_d1326127361a7a02596e1e273063544d; didv=1686713337000;";
const CHALLENGE_RESULT: i64 = 400002;

pub struct KuaishouResolver {
    client: reqwest::Client,
    no_redirect: reqwest::Client,
    max_hops: usize,
}

impl KuaishouResolver {
    pub fn new(net: &NetworkSettings) -> Result<Self> {
        Ok(Self {
            client: http_client::build(http_client::client_builder(net).user_agent(USER_AGENT))?,
            no_redirect: http_client::build(http_client::no_redirect_builder(net).user_agent(USER_AGENT))?,
            max_hops: net.max_redirects,
        })
    }

    /// Long-video pages are rendered without the photo payload; the photo
    /// route serves the same item with it.
    fn rewrite_location(location: String) -> String {
        if location.contains("/fw/long-video/") {
            location.replace("/fw/long-video/", "/fw/photo/")
        } else {
            location
        }
    }

    /// Finds the entry of `INIT_STATE` that carries `photo` and `result`.
    pub fn parse_init_state(html: &str) -> Result<Value> {
        let json = shared::embedded_json(html, INIT_STATE)
            .ok_or_else(|| shared::missing_payload(Platform::Kuaishou, html, &["\"result\":400002"]))?;
        let state: Value = serde_json::from_str(json)
            .map_err(|e| ResolveError::schema(Platform::Kuaishou, format!("INIT_STATE: {}", e)))?;

        let entry = state
            .as_object()
            .and_then(|obj| {
                obj.values()
                    .find(|v| v.get("photo").is_some() && v.get("result").is_some())
                    .or_else(|| obj.values().find(|v| v.get("result").is_some()))
            })
            .ok_or_else(|| ResolveError::schema(Platform::Kuaishou, "no photo entry in INIT_STATE"))?;

        match entry.get("result").and_then(|v| v.as_i64()) {
            Some(1) => {}
            Some(CHALLENGE_RESULT) => {
                tracing::warn!("Kuaishou: INIT_STATE reports verification required");
                return Err(ResolveError::challenge(Platform::Kuaishou));
            }
            Some(code) => {
                return Err(ResolveError::NotFound(format!("kuaishou result code {}", code)));
            }
            None => {}
        }

        entry
            .get("photo")
            .filter(|p| p.is_object())
            .cloned()
            .ok_or_else(|| ResolveError::NotFound("kuaishou entry has no photo".into()))
    }

    pub fn photo_to_raw(photo: &Value) -> RawMedia {
        let mut raw = RawMedia::new(Platform::Kuaishou);
        raw.title = string_at(photo, "/caption");
        raw.author = Author {
            uid: str_at(photo, "/userEid")
                .map(|s| s.to_string())
                .unwrap_or_else(|| string_at(photo, "/userId")),
            name: string_at(photo, "/userName"),
            avatar_url: string_at(photo, "/headUrl"),
        };
        raw.cover_url = string_at(photo, "/coverUrls/0/url");
        raw.music_url = str_at(photo, "/music/audioUrls/0/url").map(|s| s.to_string());

        if let (Some(cdn), Some(list)) = (
            str_at(photo, "/ext_params/atlas/cdn/0"),
            photo.pointer("/ext_params/atlas/list").and_then(|v| v.as_array()),
        ) {
            raw.images = list
                .iter()
                .filter_map(|p| p.as_str())
                .map(|path| ImageRef::new(format!("https://{}/{}", cdn, path.trim_start_matches('/'))))
                .collect();
        }
        if !raw.images.is_empty() {
            return raw;
        }

        raw.video_url = str_at(photo, "/mainMvUrls/0/url").map(|s| s.to_string());
        if let Some(sets) = photo.pointer("/manifest/adaptationSet").and_then(|v| v.as_array()) {
            for rep in sets
                .iter()
                .filter_map(|set| set.get("representation").and_then(|v| v.as_array()))
                .flatten()
            {
                let Some(url) = str_at(rep, "/url") else {
                    continue;
                };
                let height = u64_at(rep, "/height").unwrap_or(0);
                let label = str_at(rep, "/qualityLabel")
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("{}p", height));
                let rank = if height > 0 {
                    height
                } else {
                    u64_at(rep, "/avgBitrate").unwrap_or(0)
                };
                raw.qualities
                    .push(RawQuality::new(label, url, rank).with_size(u64_at(rep, "/fileSize")));
            }
        }
        raw
    }
}

#[async_trait]
impl PlatformResolver for KuaishouResolver {
    fn platform(&self) -> Platform {
        Platform::Kuaishou
    }

    async fn resolve(&self, url: &str) -> Result<RawMedia> {
        let final_url = redirect::follow_redirects(
            &self.no_redirect,
            url,
            USER_AGENT,
            self.max_hops,
            Self::rewrite_location,
        )
        .await?;
        tracing::debug!("Kuaishou: fetching {}", final_url);

        let response = self
            .client
            .get(&final_url)
            .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header(COOKIE, COOKIE_VALUE)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ResolveError::schema(
                Platform::Kuaishou,
                format!("share page HTTP {}", response.status()),
            ));
        }
        let html = response.text().await?;

        let photo = Self::parse_init_state(&html)?;
        Ok(Self::photo_to_raw(&photo))
    }
}

use async_trait::async_trait;
use serde_json::Value;

use vidlink_core::models::media::{Author, ImageRef};
use vidlink_core::models::settings::NetworkSettings;
use vidlink_core::platforms::Platform;

use crate::core::http_client::{self, MOBILE_USER_AGENT};
use crate::core::redirect;
use crate::error::{ResolveError, Result};
use crate::models::raw::{RawMedia, RawQuality};
use crate::platforms::shared::{self, str_at, string_at};
use crate::platforms::traits::PlatformResolver;

const VARIANTS: &[(&str, &str, u64)] = &[
    ("origin_video", "original", 4),
    ("video_high", "high", 3),
    ("video_mid", "mid", 2),
    ("video_low", "low", 1),
];

pub struct PipixiaResolver {
    client: reqwest::Client,
    no_redirect: reqwest::Client,
}

impl PipixiaResolver {
    pub fn new(net: &NetworkSettings) -> Result<Self> {
        Ok(Self {
            client: http_client::build(http_client::client_builder(net).user_agent(MOBILE_USER_AGENT))?,
            no_redirect: http_client::build(
                http_client::no_redirect_builder(net).user_agent(MOBILE_USER_AGENT),
            )?,
        })
    }

    /// `/item/{id}` or `/ppx/item/{id}`.
    fn extract_cell_id(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
        let pos = segments.iter().position(|s| *s == "item")?;
        segments
            .get(pos + 1)
            .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
            .map(|id| id.to_string())
    }

    fn api_url(cell_id: &str) -> String {
        format!(
            "https://api.pipix.com/bds/cell/cell_comment/?offset=0&cell_type=1&api_version=1&cell_id={}&ac=wifi&channel=huawei_1319_64&aid=1319&app_name=super",
            cell_id
        )
    }

    pub fn parse_cell(body: &Value) -> Result<RawMedia> {
        if let Some(status) = body.get("status_code").and_then(|v| v.as_i64()) {
            if status != 0 {
                return Err(ResolveError::NotFound(format!(
                    "pipixia status {}: {}",
                    status,
                    string_at(body, "/message")
                )));
            }
        }
        let item = body
            .pointer("/data/cell_comments/0/comment_info/item")
            .filter(|v| v.is_object())
            .ok_or_else(|| ResolveError::schema(Platform::Pipixia, "no item in cell_comments"))?;

        let author_id = string_at(item, "/author/id");
        let mut raw = RawMedia::new(Platform::Pipixia);
        raw.title = string_at(item, "/content");
        raw.cover_url = string_at(item, "/cover/url_list/0/url");
        raw.author = Author {
            uid: author_id.clone(),
            name: string_at(item, "/author/name"),
            avatar_url: string_at(item, "/author/avatar/download_list/0/url"),
        };

        if let Some(images) = item.pointer("/note/multi_image").and_then(|v| v.as_array()) {
            raw.images = images
                .iter()
                .filter_map(|img| str_at(img, "/url_list/0/url"))
                .map(ImageRef::new)
                .collect();
        }
        if !raw.images.is_empty() {
            return Ok(raw);
        }

        for (field, label, rank) in VARIANTS {
            if let Some(url) = str_at(item, &format!("/video/{}/url_list/0/url", field)) {
                raw.qualities.push(RawQuality::new(*label, url, *rank));
            }
        }

        // The author's own comment carries the upload without the overlay.
        raw.video_url = item
            .get("comments")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter(|c| !author_id.is_empty() && string_at(c, "/item/author/id") == author_id)
            .find_map(|c| str_at(c, "/item/video/video_high/url_list/0/url"))
            .map(|s| s.to_string());

        Ok(raw)
    }
}

#[async_trait]
impl PlatformResolver for PipixiaResolver {
    fn platform(&self) -> Platform {
        Platform::Pipixia
    }

    async fn resolve(&self, url: &str) -> Result<RawMedia> {
        let cell_id = match Self::extract_cell_id(url) {
            Some(id) => id,
            None => {
                let location = redirect::resolve_redirect(&self.no_redirect, url, MOBILE_USER_AGENT)
                    .await?
                    .ok_or_else(|| {
                        ResolveError::schema(Platform::Pipixia, "share link did not redirect")
                    })?;
                tracing::debug!("Pipixia: {} -> {}", url, location);
                Self::extract_cell_id(&location).ok_or_else(|| {
                    ResolveError::schema(Platform::Pipixia, format!("no cell id in {}", location))
                })?
            }
        };

        let response = self.client.get(Self::api_url(&cell_id)).send().await?;
        shared::check_api_status(Platform::Pipixia, response.status())?;
        let body = shared::parse_json(Platform::Pipixia, &response.text().await?)?;
        Self::parse_cell(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cell_ids() {
        assert_eq!(
            PipixiaResolver::extract_cell_id("https://h5.pipix.com/item/7012345678?app_id=1319").as_deref(),
            Some("7012345678")
        );
        assert_eq!(
            PipixiaResolver::extract_cell_id("https://h5.pipix.com/ppx/item/7099").as_deref(),
            Some("7099")
        );
        assert_eq!(PipixiaResolver::extract_cell_id("https://h5.pipix.com/s/abc/"), None);
    }

    #[test]
    fn video_prefers_author_comment() {
        let body = json!({"status_code":0,"data":{"cell_comments":[{"comment_info":{"item":{
            "content":"cat jumps",
            "author":{"id":"555","name":"catlover","avatar":{"download_list":[{"url":"https://p3.pstatp.com/avatar.jpg"}]}},
            "cover":{"url_list":[{"url":"https://p3.pstatp.com/cover.jpg"}]},
            "video":{
                "video_high":{"url_list":[{"url":"https://v3.pipix.com/high_wm.mp4"}]},
                "video_low":{"url_list":[{"url":"https://v3.pipix.com/low_wm.mp4"}]}
            },
            "comments":[
                {"item":{"author":{"id":"999"},"video":{"video_high":{"url_list":[{"url":"https://v3.pipix.com/other.mp4"}]}}}},
                {"item":{"author":{"id":"555"},"video":{"video_high":{"url_list":[{"url":"https://v3.pipix.com/clean.mp4"}]}}}}
            ]
        }}}]}});
        let raw = PipixiaResolver::parse_cell(&body).unwrap();
        assert_eq!(raw.platform, Platform::Pipixia);
        assert_eq!(raw.author.uid, "555");
        assert_eq!(raw.video_url.as_deref(), Some("https://v3.pipix.com/clean.mp4"));

        let d = crate::core::normalizer::normalize(raw).unwrap();
        assert_eq!(d.video_url, "https://v3.pipix.com/clean.mp4");
        let labels: Vec<String> = d.video_qualities.unwrap().into_iter().map(|q| q.quality).collect();
        assert_eq!(labels, vec!["high", "low"]);
    }

    #[test]
    fn gallery_note() {
        let body = json!({"data":{"cell_comments":[{"comment_info":{"item":{
            "content":"memes","author":{"id":"1"},
            "note":{"multi_image":[
                {"url_list":[{"url":"https://p3.pstatp.com/1.jpg"}]},
                {"url_list":[]}
            ]}
        }}}]}});
        let raw = PipixiaResolver::parse_cell(&body).unwrap();
        assert_eq!(raw.images.len(), 1);
        assert!(raw.video_url.is_none());
    }

    #[test]
    fn missing_item() {
        let body = json!({"data":{"cell_comments":[]}});
        assert_eq!(PipixiaResolver::parse_cell(&body).unwrap_err().kind(), "SchemaMismatch");
        let gone = json!({"status_code":2,"message":"deleted"});
        assert_eq!(PipixiaResolver::parse_cell(&gone).unwrap_err().kind(), "NotFound");
    }
}

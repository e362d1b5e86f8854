use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, COOKIE, REFERER};
use serde_json::Value;

use vidlink_core::models::media::{Author, ImageRef};
use vidlink_core::models::settings::NetworkSettings;
use vidlink_core::platforms::Platform;

use crate::core::http_client::{self, DESKTOP_USER_AGENT, MOBILE_USER_AGENT};
use crate::error::{ResolveError, Result};
use crate::models::raw::{RawMedia, RawQuality};
use crate::platforms::shared::{self, str_at, string_at};
use crate::platforms::traits::PlatformResolver;

const VISITOR_COOKIE: &str = "login_sid_t=6b652c77c1a4bc50cb9d06b24923210d; cross_origin_proto=SSL; _s_tentry=passport.weibo.com; SUB=_2AkMXuScYf8NxqwJRmf8RzmnhaoxwzwDEieKh5dbDJRMxHRl-yT9jqhALtRB6PDkJ9w8OaqJAbsgjdEWtIcilcZxHG7rw; SUBP=0033WrSXqPxfM72-Ws9jqgMF55529P9D9W5Qx3Mf.RCfFAKC3smW0px0";
const CHALLENGE_MARKERS: &[&str] = &["passport.weibo.com/visitor", "Sina Visitor System"];

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static FID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"video\.weibo\.com/show\?fid=([^"&\s<]+)"#).unwrap());
static SIZED_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^/]+\.sinaimg\.cn/(?:mw\d+|orj\d+|large|original|bmiddle|thumbnail|crop[^/]*)/(.+)$").unwrap()
});
static RENDER_DATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\$render_data\s*=\s*(\[.*?\])\[0\]").unwrap());
static HEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{3,4})[pP]").unwrap());

#[derive(Debug, PartialEq, Eq)]
enum Target {
    Video(String),
    Post(String),
}

pub struct WeiboResolver {
    client: reqwest::Client,
}

impl WeiboResolver {
    pub fn new(net: &NetworkSettings) -> Result<Self> {
        Ok(Self {
            client: http_client::build(http_client::client_builder(net))?,
        })
    }

    fn classify(url: &str) -> Option<Target> {
        let parsed = url::Url::parse(url).ok()?;
        if let Some((_, fid)) = parsed.query_pairs().find(|(k, _)| k == "fid") {
            return Some(Target::Video(fid.to_string()));
        }
        if let Some(id) = parsed.path().strip_prefix("/tv/show/") {
            return Some(Target::Video(id.trim_matches('/').to_string()));
        }
        let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
        if segments.len() >= 2 {
            return segments.last().map(|s| Target::Post(s.to_string()));
        }
        None
    }

    /// Image hosts other than `ww1` reject foreign referers; the `large`
    /// rendition on `ww1` is the least restricted form of the same file.
    pub fn rewrite_image_host(url: &str) -> String {
        if let Some(caps) = SIZED_IMAGE_RE.captures(url) {
            return format!("https://ww1.sinaimg.cn/large/{}", &caps[1]);
        }
        let Ok(mut parsed) = url::Url::parse(url) else {
            return url.to_string();
        };
        let is_mirror = parsed.host_str().is_some_and(|h| {
            h.ends_with(".sinaimg.cn") && (h.starts_with("wx") || h.starts_with("tva"))
        });
        if is_mirror && parsed.set_host(Some("ww1.sinaimg.cn")).is_ok() {
            return parsed.to_string();
        }
        url.to_string()
    }

    fn clean_text(text: &str) -> String {
        TAG_RE.replace_all(text, "").trim().to_string()
    }

    fn https(scheme_relative: &str) -> String {
        if scheme_relative.starts_with("//") {
            format!("https:{}", scheme_relative)
        } else {
            scheme_relative.to_string()
        }
    }

    fn label_rank(label: &str) -> u64 {
        HEIGHT_RE
            .captures(label)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0)
    }

    /// `data.Component_Play_Playinfo` of the h5 video component API.
    pub fn parse_play_info(body: &Value) -> Result<RawMedia> {
        let info = body
            .pointer("/data/Component_Play_Playinfo")
            .filter(|v| v.is_object())
            .ok_or_else(|| ResolveError::schema(Platform::Weibo, "no Component_Play_Playinfo"))?;

        let mut raw = RawMedia::new(Platform::Weibo);
        raw.title = Self::clean_text(&string_at(info, "/title"));
        raw.cover_url = Self::https(&string_at(info, "/cover_image"));
        raw.author = Author {
            uid: string_at(info, "/user/id"),
            name: str_at(info, "/author")
                .map(|s| s.to_string())
                .unwrap_or_else(|| string_at(info, "/user/screen_name")),
            avatar_url: Self::https(&string_at(info, "/avatar")),
        };

        if let Some(urls) = info.get("urls").and_then(|v| v.as_object()) {
            for (label, url) in urls {
                let Some(url) = url.as_str().filter(|s| !s.is_empty()) else {
                    continue;
                };
                raw.qualities
                    .push(RawQuality::new(label.as_str(), Self::https(url), Self::label_rank(label)));
            }
        }
        if raw.qualities.is_empty() {
            if let Some(url) = str_at(info, "/stream_url") {
                raw.video_url = Some(Self::https(url));
            }
        }
        if raw.qualities.is_empty() && raw.video_url.is_none() {
            return Err(ResolveError::NotFound("weibo video has no playable urls".into()));
        }
        Ok(raw)
    }

    /// `data` of `m.weibo.cn/statuses/show`. Also returns a video fid when
    /// the post only links to a video page.
    pub fn parse_status(data: &Value) -> (RawMedia, Option<String>) {
        let text = string_at(data, "/text");
        let mut raw = RawMedia::new(Platform::Weibo);
        raw.title = Self::clean_text(&text);
        raw.author = Author {
            uid: string_at(data, "/user/id"),
            name: string_at(data, "/user/screen_name"),
            avatar_url: Self::rewrite_image_host(&string_at(data, "/user/avatar_large")),
        };

        let mut fid = None;
        if let Some(page) = data.get("page_info") {
            let pic = str_at(page, "/page_pic/url").or_else(|| str_at(page, "/page_pic"));
            if let Some(pic) = pic {
                raw.cover_url = Self::rewrite_image_host(pic);
            }
            if let Some(media) = page.get("media_info") {
                const FIELDS: &[(&str, &str, u64)] = &[
                    ("mp4_720p_mp4", "720p", 720),
                    ("stream_url_hd", "hd", 540),
                    ("mp4_hd_url", "hd", 540),
                    ("mp4_sd_url", "sd", 360),
                    ("stream_url", "sd", 360),
                ];
                for (field, label, rank) in FIELDS {
                    if let Some(url) = str_at(media, &format!("/{}", field)) {
                        raw.qualities.push(RawQuality::new(*label, url, *rank));
                    }
                }
            }
            if raw.qualities.is_empty() {
                fid = str_at(page, "/page_url")
                    .and_then(|u| FID_RE.captures(u))
                    .map(|c| c[1].to_string());
            }
        }
        if raw.qualities.is_empty() && fid.is_none() {
            fid = FID_RE.captures(&text).map(|c| c[1].to_string());
        }

        raw.images = Self::pictures(data);
        if raw.cover_url.is_empty() {
            if let Some(first) = raw.images.first() {
                raw.cover_url = first.url.clone();
            }
        }
        (raw, fid)
    }

    fn pictures(data: &Value) -> Vec<ImageRef> {
        let mut urls = Vec::new();
        if let Some(infos) = data.get("pic_infos").and_then(|v| v.as_object()) {
            let ordered: Vec<&Value> = match data.get("pic_ids").and_then(|v| v.as_array()) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| id.as_str().and_then(|id| infos.get(id)))
                    .collect(),
                None => infos.values().collect(),
            };
            for pic in ordered {
                let url = ["/largest/url", "/original/url", "/large/url", "/bmiddle/url"]
                    .iter()
                    .find_map(|p| str_at(pic, p));
                if let Some(url) = url {
                    urls.push(url.to_string());
                }
            }
        } else if let Some(pics) = data.get("pics").and_then(|v| v.as_array()) {
            for pic in pics {
                let url = ["/large/url", "/original/url", "/bmiddle/url", "/url"]
                    .iter()
                    .find_map(|p| str_at(pic, p));
                if let Some(url) = url {
                    urls.push(url.to_string());
                }
            }
        }
        urls.iter()
            .map(|u| ImageRef::new(Self::rewrite_image_host(u)))
            .collect()
    }

    /// Desktop page fallback: `var $render_data = [{...}][0]`.
    pub fn parse_render_data(html: &str) -> Result<RawMedia> {
        let caps = RENDER_DATA_RE
            .captures(html)
            .ok_or_else(|| shared::missing_payload(Platform::Weibo, html, CHALLENGE_MARKERS))?;
        let list: Value = serde_json::from_str(&caps[1])
            .map_err(|e| ResolveError::schema(Platform::Weibo, format!("$render_data: {}", e)))?;
        let status = list
            .pointer("/0/status")
            .ok_or_else(|| ResolveError::schema(Platform::Weibo, "$render_data without status"))?;
        Ok(Self::parse_status(status).0)
    }

    async fn fetch_play_info(&self, fid: &str) -> Result<RawMedia> {
        let api = format!("https://h5.video.weibo.com/api/component?page=/show/{}", fid);
        tracing::debug!("Weibo: video component for {}", fid);
        let response = self
            .client
            .post(&api)
            .header(COOKIE, VISITOR_COOKIE)
            .header(REFERER, format!("https://h5.video.weibo.com/show/{}", fid))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(reqwest::header::USER_AGENT, MOBILE_USER_AGENT)
            .body(format!(
                "data={}",
                urlencoding::encode(&format!(r#"{{"Component_Play_Playinfo":{{"oid":"{}"}}}}"#, fid))
            ))
            .send()
            .await?;
        shared::check_api_status(Platform::Weibo, response.status())?;
        let body = shared::parse_json(Platform::Weibo, &response.text().await?)?;
        Self::parse_play_info(&body)
    }

    /// Keeps the post fields and takes the streams from the linked video.
    /// A post with nothing else to offer surfaces the video's failure as is.
    fn attach_linked_video(mut raw: RawMedia, fid: &str, video: Result<RawMedia>) -> Result<RawMedia> {
        match video {
            Ok(video) => {
                raw.qualities = video.qualities;
                raw.video_url = video.video_url;
                if raw.cover_url.is_empty() {
                    raw.cover_url = video.cover_url;
                }
                Ok(raw)
            }
            Err(e) if raw.images.is_empty() && raw.qualities.is_empty() && raw.video_url.is_none() => {
                Err(e)
            }
            Err(e) => {
                tracing::warn!("Weibo: linked video {} failed, keeping post media: {}", fid, e);
                Ok(raw)
            }
        }
    }

    /// `Ok(None)` when the mobile API answers in a shape we cannot use; the
    /// caller then tries the desktop page. Challenges and 404s propagate.
    async fn fetch_status(&self, id: &str) -> Result<Option<Value>> {
        let api = format!("https://m.weibo.cn/statuses/show?id={}", id);
        let response = self
            .client
            .get(&api)
            .header(reqwest::header::USER_AGENT, MOBILE_USER_AGENT)
            .header(REFERER, "https://m.weibo.cn/")
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?;
        match shared::check_api_status(Platform::Weibo, response.status()) {
            Ok(()) => {}
            Err(ResolveError::SchemaMismatch { detail, .. }) => {
                tracing::debug!("Weibo: statuses/show {}", detail);
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        let body: Value = match serde_json::from_str(&response.text().await?) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Weibo: statuses/show is not JSON: {}", e);
                return Ok(None);
            }
        };
        Ok(body.get("data").filter(|d| d.is_object()).cloned())
    }

    async fn resolve_post(&self, id: &str, original_url: &str) -> Result<RawMedia> {
        if let Some(data) = self.fetch_status(id).await? {
            let (raw, fid) = Self::parse_status(&data);
            return match fid {
                Some(fid) => {
                    let video = self.fetch_play_info(&fid).await;
                    Self::attach_linked_video(raw, &fid, video)
                }
                None => Ok(raw),
            };
        }

        tracing::debug!("Weibo: mobile API gave nothing, parsing {}", original_url);
        let response = self
            .client
            .get(original_url)
            .header(reqwest::header::USER_AGENT, DESKTOP_USER_AGENT)
            .send()
            .await?;
        shared::check_api_status(Platform::Weibo, response.status())?;
        let html = response.text().await?;
        Self::parse_render_data(&html)
    }
}

#[async_trait]
impl PlatformResolver for WeiboResolver {
    fn platform(&self) -> Platform {
        Platform::Weibo
    }

    async fn resolve(&self, url: &str) -> Result<RawMedia> {
        match Self::classify(url) {
            Some(Target::Video(fid)) => self.fetch_play_info(&fid).await,
            Some(Target::Post(id)) => self.resolve_post(&id, url).await,
            None => Err(ResolveError::schema(
                Platform::Weibo,
                format!("unrecognised weibo url {}", url),
            )),
        }
    }
}

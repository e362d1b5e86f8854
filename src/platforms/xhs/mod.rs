use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use vidlink_core::models::media::{Author, ImageRef};
use vidlink_core::models::settings::NetworkSettings;
use vidlink_core::platforms::Platform;

use crate::core::http_client::{self, DESKTOP_USER_AGENT};
use crate::error::{ResolveError, Result};
use crate::models::raw::{RawMedia, RawQuality};
use crate::platforms::shared::{self, str_at, string_at, u64_at};
use crate::platforms::traits::PlatformResolver;

const INITIAL_STATE: &str = "window.__INITIAL_STATE__";
const CHALLENGE_MARKERS: &[&str] = &["website-login/captcha", "/website-login/error"];
const IMAGE_HOST: &str = "https://sns-img-bd.xhscdn.com";
const VIDEO_HOST: &str = "https://sns-video-bd.xhscdn.com";
const CODECS: &[&str] = &["h265", "h264", "av1", "h266"];

static UNDEFINED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([:,\[])\s*undefined\b").unwrap());

pub struct XhsResolver {
    client: reqwest::Client,
}

impl XhsResolver {
    pub fn new(net: &NetworkSettings) -> Result<Self> {
        Ok(Self {
            client: http_client::build(http_client::client_builder(net).user_agent(DESKTOP_USER_AGENT))?,
        })
    }

    /// The state is a JS object literal; `undefined` values are the only
    /// thing standing between it and JSON.
    pub fn parse_initial_state(html: &str) -> Result<Value> {
        let literal = shared::embedded_json(html, INITIAL_STATE)
            .ok_or_else(|| shared::missing_payload(Platform::Xhs, html, CHALLENGE_MARKERS))?;
        let json = UNDEFINED_RE.replace_all(literal, "${1}null");
        serde_json::from_str(&json)
            .map_err(|e| ResolveError::schema(Platform::Xhs, format!("__INITIAL_STATE__: {}", e)))
    }

    pub fn find_note(state: &Value) -> Result<&Value> {
        if let Some(note) = state.pointer("/note/note").filter(|n| n.is_object()) {
            return Ok(note);
        }
        let map = state
            .pointer("/note/noteDetailMap")
            .and_then(|v| v.as_object())
            .ok_or_else(|| ResolveError::schema(Platform::Xhs, "no noteDetailMap in state"))?;

        let preferred = str_at(state, "/note/firstNoteId").and_then(|id| map.get(id));
        preferred
            .into_iter()
            .chain(map.values())
            .filter_map(|entry| entry.get("note"))
            .find(|note| note.get("noteId").is_some() || note.get("type").is_some())
            .ok_or_else(|| ResolveError::NotFound("xhs note is missing or deleted".into()))
    }

    /// `.../{timestamp}/{hash}/{token}!{style}` becomes the bare token on the
    /// origin image host, which serves it without the watermark overlay.
    fn image_origin(url: &str) -> String {
        let fallback = || url.replacen("http://", "https://", 1);
        let Ok(parsed) = url::Url::parse(url) else {
            return fallback();
        };
        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        if segments.len() < 3 {
            return fallback();
        }
        let token = segments[2..].join("/");
        let token = token.split('!').next().unwrap_or(&token);
        format!("{}/{}", IMAGE_HOST, token)
    }

    /// Height first; bitrate only breaks ties inside one height.
    fn stream_rank(height: u64, bitrate: u64) -> u64 {
        height
            .saturating_mul(100_000)
            .saturating_add((bitrate / 100).min(99_999))
    }

    pub fn note_to_raw(note: &Value) -> RawMedia {
        let mut raw = RawMedia::new(Platform::Xhs);
        raw.title = str_at(note, "/title")
            .map(|s| s.to_string())
            .unwrap_or_else(|| string_at(note, "/desc").lines().next().unwrap_or("").to_string());
        raw.author = Author {
            uid: string_at(note, "/user/userId"),
            name: string_at(note, "/user/nickname"),
            avatar_url: string_at(note, "/user/avatar"),
        };
        raw.cover_url = str_at(note, "/imageList/0/urlDefault")
            .map(Self::image_origin)
            .unwrap_or_default();

        if str_at(note, "/type") == Some("video") {
            raw.video_url = str_at(note, "/video/consumer/originVideoKey")
                .map(|key| format!("{}/{}", VIDEO_HOST, key));
            for codec in CODECS {
                let pointer = format!("/video/media/stream/{}", codec);
                let Some(streams) = note.pointer(&pointer).and_then(|v| v.as_array()) else {
                    continue;
                };
                for stream in streams {
                    let Some(url) = str_at(stream, "/masterUrl") else {
                        continue;
                    };
                    let height = u64_at(stream, "/height").unwrap_or(0);
                    let label = format!("{}p {}", height, codec);
                    raw.qualities.push(
                        RawQuality::new(label, url, Self::stream_rank(height, u64_at(stream, "/videoBitrate").unwrap_or(0)))
                            .with_size(u64_at(stream, "/size")),
                    );
                }
            }
            return raw;
        }

        if let Some(list) = note.get("imageList").and_then(|v| v.as_array()) {
            raw.images = list
                .iter()
                .filter_map(|img| {
                    let url = str_at(img, "/urlDefault").or_else(|| str_at(img, "/url"))?;
                    let live = if img.get("livePhoto").and_then(|v| v.as_bool()) == Some(true) {
                        str_at(img, "/stream/h264/0/masterUrl").map(|s| s.to_string())
                    } else {
                        None
                    };
                    Some(ImageRef {
                        url: Self::image_origin(url),
                        live_photo_url: live,
                    })
                })
                .collect();
        }
        raw
    }
}

#[async_trait]
impl PlatformResolver for XhsResolver {
    fn platform(&self) -> Platform {
        Platform::Xhs
    }

    async fn resolve(&self, url: &str) -> Result<RawMedia> {
        tracing::debug!("Xhs: fetching {}", url);
        let response = self.client.get(url).send().await?;
        let final_url = response.url().to_string();
        if CHALLENGE_MARKERS.iter().any(|m| final_url.contains(m)) {
            tracing::warn!("Xhs: redirected to login wall {}", final_url);
            return Err(ResolveError::challenge(Platform::Xhs));
        }
        if !response.status().is_success() {
            return Err(ResolveError::schema(
                Platform::Xhs,
                format!("share page HTTP {}", response.status()),
            ));
        }
        let html = response.text().await?;

        let state = Self::parse_initial_state(&html)?;
        let note = Self::find_note(&state)?;
        Ok(Self::note_to_raw(note))
    }
}

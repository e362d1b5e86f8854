use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;

use vidlink_core::models::media::Author;
use vidlink_core::models::settings::NetworkSettings;
use vidlink_core::platforms::Platform;

use crate::core::http_client::{self, DESKTOP_USER_AGENT, MOBILE_USER_AGENT};
use crate::core::redirect;
use crate::error::{ResolveError, Result};
use crate::models::raw::{RawMedia, RawQuality};
use crate::platforms::shared::{self, str_at, string_at, u64_at};
use crate::platforms::traits::PlatformResolver;

pub struct XiguaResolver {
    client: reqwest::Client,
    no_redirect: reqwest::Client,
}

impl XiguaResolver {
    pub fn new(net: &NetworkSettings) -> Result<Self> {
        Ok(Self {
            client: http_client::build(http_client::client_builder(net).user_agent(DESKTOP_USER_AGENT))?,
            no_redirect: http_client::build(
                http_client::no_redirect_builder(net).user_agent(MOBILE_USER_AGENT),
            )?,
        })
    }

    fn extract_item_id(url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        parsed
            .path_segments()?
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_start_matches('i'))
            .find(|s| s.len() >= 8 && s.chars().all(|c| c.is_ascii_digit()))
            .map(|s| s.to_string())
    }

    /// Metadata from `m.toutiao.com/i{id}/info/`, plus the VOD play-info
    /// query carried inside `play_auth_token_v2`.
    pub fn parse_info(body: &Value) -> Result<(RawMedia, Option<String>)> {
        if body.get("success").and_then(|v| v.as_bool()) != Some(true) {
            return Err(ResolveError::NotFound(format!(
                "toutiao info unsuccessful: {}",
                string_at(body, "/message")
            )));
        }
        let data = body
            .get("data")
            .filter(|d| d.is_object())
            .ok_or_else(|| ResolveError::schema(Platform::Xigua, "info without data"))?;

        let mut raw = RawMedia::new(Platform::Xigua);
        raw.title = string_at(data, "/title");
        raw.cover_url = string_at(data, "/poster_url");
        let source = string_at(data, "/detail_source");
        raw.author = Author {
            uid: string_at(data, "/media_user/user_id"),
            name: str_at(data, "/media_user/screen_name")
                .map(|s| s.to_string())
                .unwrap_or(source),
            avatar_url: string_at(data, "/media_user/avatar_url"),
        };

        let query = str_at(data, "/play_auth_token_v2").and_then(Self::decode_play_token);
        Ok((raw, query))
    }

    fn decode_play_token(token: &str) -> Option<String> {
        let decoded = base64::engine::general_purpose::STANDARD.decode(token).ok()?;
        let json: Value = serde_json::from_slice(&decoded).ok()?;
        str_at(&json, "/GetPlayInfoToken").map(|s| s.to_string())
    }

    fn play_rank(height: u64, bitrate: u64) -> u64 {
        height
            .saturating_mul(10_000_000)
            .saturating_add(bitrate.min(9_999_999))
    }

    pub fn parse_play_info(body: &Value) -> Result<Vec<RawQuality>> {
        let list = body
            .pointer("/Result/Data/PlayInfoList")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                let code = string_at(body, "/ResponseMetadata/Error/Code");
                ResolveError::schema(Platform::Xigua, format!("no PlayInfoList ({})", code))
            })?;

        Ok(list
            .iter()
            .filter_map(|info| {
                let url = str_at(info, "/MainPlayUrl").or_else(|| str_at(info, "/BackupPlayUrl"))?;
                let height = u64_at(info, "/Height").unwrap_or(0);
                let label = str_at(info, "/Definition")
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("{}p", height));
                let rank = Self::play_rank(height, u64_at(info, "/Bitrate").unwrap_or(0));
                Some(RawQuality::new(label, url, rank).with_size(u64_at(info, "/Size")))
            })
            .collect())
    }
}

#[async_trait]
impl PlatformResolver for XiguaResolver {
    fn platform(&self) -> Platform {
        Platform::Xigua
    }

    async fn resolve(&self, url: &str) -> Result<RawMedia> {
        let item_id = match Self::extract_item_id(url) {
            Some(id) => id,
            None => {
                let location = redirect::resolve_redirect(&self.no_redirect, url, MOBILE_USER_AGENT)
                    .await?
                    .unwrap_or_else(|| url.to_string());
                Self::extract_item_id(&location).ok_or_else(|| {
                    ResolveError::schema(Platform::Xigua, format!("no item id in {}", location))
                })?
            }
        };
        tracing::debug!("Xigua: item {}", item_id);

        let response = self
            .client
            .get(format!("https://m.toutiao.com/i{}/info/", item_id))
            .send()
            .await?;
        shared::check_api_status(Platform::Xigua, response.status())?;
        let body = shared::parse_json(Platform::Xigua, &response.text().await?)?;
        let (mut raw, query) = Self::parse_info(&body)?;

        let query = query.ok_or_else(|| ResolveError::schema(Platform::Xigua, "no play token"))?;
        let response = self
            .client
            .get(format!("https://vod.bytedanceapi.com/?{}", query))
            .send()
            .await?;
        shared::check_api_status(Platform::Xigua, response.status())?;
        let body = shared::parse_json(Platform::Xigua, &response.text().await?)?;
        raw.qualities = Self::parse_play_info(&body)?;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_ids() {
        assert_eq!(
            XiguaResolver::extract_item_id("https://www.ixigua.com/7301234567890123456?logTag=x").as_deref(),
            Some("7301234567890123456")
        );
        assert_eq!(
            XiguaResolver::extract_item_id("https://m.toutiao.com/i7301234567890123456/").as_deref(),
            Some("7301234567890123456")
        );
        assert_eq!(XiguaResolver::extract_item_id("https://v.ixigua.com/iRfAbCd/"), None);
    }

    #[test]
    fn info_with_token() {
        let token = base64::engine::general_purpose::STANDARD
            .encode(r#"{"GetPlayInfoToken":"Action=GetPlayInfo&Version=2020-08-01&Vid=v0d"}"#);
        let body = json!({"success":true,"data":{
            "title":"mountain drive","poster_url":"https://p3.toutiaoimg.com/poster.jpg",
            "detail_source":"channel","media_user":{"user_id":123,"screen_name":"driver","avatar_url":"https://p3.toutiaoimg.com/a.jpg"},
            "play_auth_token_v2":token
        }});
        let (raw, query) = XiguaResolver::parse_info(&body).unwrap();
        assert_eq!(raw.platform, Platform::Xigua);
        assert_eq!(raw.author.uid, "123");
        assert_eq!(raw.author.name, "driver");
        assert_eq!(query.as_deref(), Some("Action=GetPlayInfo&Version=2020-08-01&Vid=v0d"));
    }

    #[test]
    fn unsuccessful_info_is_not_found() {
        let body = json!({"success":false,"message":"error"});
        assert_eq!(XiguaResolver::parse_info(&body).unwrap_err().kind(), "NotFound");
    }

    #[test]
    fn play_info_ranked_by_height() {
        let body = json!({"Result":{"Data":{"PlayInfoList":[
            {"Definition":"480p","MainPlayUrl":"https://v3.toutiaovod.com/480.mp4","Height":480,"Bitrate":500000,"Size":100},
            {"Definition":"1080p","MainPlayUrl":"https://v3.toutiaovod.com/1080.mp4","Height":1080,"Bitrate":2000000,"Size":900},
            {"Definition":"720p","MainPlayUrl":"","Height":720}
        ]}}});
        let qualities = XiguaResolver::parse_play_info(&body).unwrap();
        assert_eq!(qualities.len(), 2);

        let mut raw = RawMedia::new(Platform::Xigua);
        raw.qualities = qualities;
        let d = crate::core::normalizer::normalize(raw).unwrap();
        assert_eq!(d.video_url, "https://v3.toutiaovod.com/1080.mp4");
        assert_eq!(d.video_qualities.unwrap()[1].quality, "480p");
    }

    #[test]
    fn oversized_height_does_not_overflow() {
        let body = json!({"Result":{"Data":{"PlayInfoList":[
            {"Definition":"huge","MainPlayUrl":"https://v3.toutiaovod.com/huge.mp4","Height":u64::MAX,"Bitrate":u64::MAX}
        ]}}});
        let qualities = XiguaResolver::parse_play_info(&body).unwrap();
        assert_eq!(qualities[0].rank, u64::MAX);
        assert!(XiguaResolver::play_rank(720, u64::MAX) < XiguaResolver::play_rank(1080, 0));
    }

    #[test]
    fn play_info_error() {
        let body = json!({"ResponseMetadata":{"Error":{"Code":"InvalidToken"}}});
        assert_eq!(XiguaResolver::parse_play_info(&body).unwrap_err().kind(), "SchemaMismatch");
    }
}

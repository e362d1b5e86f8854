use async_trait::async_trait;
use reqwest::header::REFERER;
use serde_json::Value;

use vidlink_core::models::media::Author;
use vidlink_core::models::settings::NetworkSettings;
use vidlink_core::platforms::Platform;

use crate::core::http_client::{self, DESKTOP_USER_AGENT};
use crate::core::redirect;
use crate::error::{ResolveError, Result};
use crate::models::raw::{RawMedia, RawQuality};
use crate::platforms::shared::{self, string_at, u64_at};
use crate::platforms::traits::PlatformResolver;

const VIEW_API: &str = "https://api.bilibili.com/x/web-interface/view";
const PLAYURL_API: &str = "https://api.bilibili.com/x/player/playurl";
const REQUESTED_QN: u32 = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
enum VideoId {
    Bvid(String),
    Aid(u64),
}

impl VideoId {
    fn query(&self) -> String {
        match self {
            VideoId::Bvid(bvid) => format!("bvid={}", bvid),
            VideoId::Aid(aid) => format!("aid={}", aid),
        }
    }
}

pub struct BilibiliResolver {
    client: reqwest::Client,
    no_redirect: reqwest::Client,
    max_hops: usize,
}

impl BilibiliResolver {
    pub fn new(net: &NetworkSettings) -> Result<Self> {
        Ok(Self {
            client: http_client::build(http_client::client_builder(net).user_agent(DESKTOP_USER_AGENT))?,
            no_redirect: http_client::build(
                http_client::no_redirect_builder(net).user_agent(DESKTOP_USER_AGENT),
            )?,
            max_hops: net.max_redirects,
        })
    }

    fn extract_video_id(url: &str) -> Option<VideoId> {
        let parsed = url::Url::parse(url).ok()?;
        let segments = parsed.path_segments()?;
        for segment in segments {
            if segment.starts_with("BV") && segment.len() > 2 {
                return Some(VideoId::Bvid(segment.to_string()));
            }
            if let Some(aid) = segment
                .strip_prefix("av")
                .and_then(|n| n.parse::<u64>().ok())
            {
                return Some(VideoId::Aid(aid));
            }
        }
        None
    }

    /// 1-based `p` query parameter of multi-part videos.
    fn page_index(url: &str) -> usize {
        url::Url::parse(url)
            .ok()
            .and_then(|u| {
                u.query_pairs()
                    .find(|(k, _)| k == "p")
                    .and_then(|(_, v)| v.parse::<usize>().ok())
            })
            .filter(|p| *p >= 1)
            .unwrap_or(1)
    }

    fn check_code(body: &Value) -> Result<()> {
        let code = body.get("code").and_then(|v| v.as_i64()).unwrap_or(-1);
        let message = string_at(body, "/message");
        match code {
            0 => Ok(()),
            -404 | 62002 | 62004 => Err(ResolveError::NotFound(format!(
                "bilibili code {}: {}",
                code, message
            ))),
            -352 | -412 => {
                tracing::warn!("Bilibili: risk control code {} ({})", code, message);
                Err(ResolveError::challenge(Platform::Bilibili))
            }
            _ => Err(ResolveError::schema(
                Platform::Bilibili,
                format!("code {}: {}", code, message),
            )),
        }
    }

    /// Metadata from the view API, plus the cid of the requested part.
    pub fn parse_view(body: &Value, page: usize) -> Result<(RawMedia, u64)> {
        Self::check_code(body)?;
        let data = body
            .get("data")
            .filter(|d| d.is_object())
            .ok_or_else(|| ResolveError::schema(Platform::Bilibili, "view without data"))?;

        let cid = u64_at(data, &format!("/pages/{}/cid", page - 1))
            .or_else(|| u64_at(data, "/cid"))
            .ok_or_else(|| ResolveError::schema(Platform::Bilibili, "view without cid"))?;

        let mut raw = RawMedia::new(Platform::Bilibili);
        raw.title = string_at(data, "/title");
        raw.cover_url = string_at(data, "/pic");
        raw.author = Author {
            uid: string_at(data, "/owner/mid"),
            name: string_at(data, "/owner/name"),
            avatar_url: string_at(data, "/owner/face"),
        };
        Ok((raw, cid))
    }

    /// The playurl API serves one quality per request; its label comes from
    /// the `accept_quality`/`accept_description` pair.
    pub fn parse_playurl(body: &Value) -> Result<Vec<RawQuality>> {
        Self::check_code(body)?;
        let data = body
            .get("data")
            .ok_or_else(|| ResolveError::schema(Platform::Bilibili, "playurl without data"))?;
        let quality = u64_at(data, "/quality").unwrap_or(0);

        let label = data
            .get("accept_quality")
            .and_then(|v| v.as_array())
            .and_then(|qs| qs.iter().position(|q| q.as_u64() == Some(quality)))
            .and_then(|i| data.pointer(&format!("/accept_description/{}", i)))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("qn{}", quality));

        let segment = data
            .pointer("/durl/0")
            .ok_or_else(|| ResolveError::schema(Platform::Bilibili, "playurl without durl"))?;
        let url = shared::str_at(segment, "/url")
            .ok_or_else(|| ResolveError::schema(Platform::Bilibili, "durl without url"))?;

        Ok(vec![
            RawQuality::new(label, url, quality).with_size(u64_at(segment, "/size"))
        ])
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .header(REFERER, "https://www.bilibili.com/")
            .send()
            .await?;
        shared::check_api_status(Platform::Bilibili, response.status())?;
        let body = response.text().await?;
        shared::parse_json(Platform::Bilibili, &body)
    }
}

#[async_trait]
impl PlatformResolver for BilibiliResolver {
    fn platform(&self) -> Platform {
        Platform::Bilibili
    }

    async fn resolve(&self, url: &str) -> Result<RawMedia> {
        let mut target = url.to_string();
        if Self::extract_video_id(&target).is_none() {
            target = redirect::follow_redirects(
                &self.no_redirect,
                &target,
                DESKTOP_USER_AGENT,
                self.max_hops,
                |location| location,
            )
            .await?;
            tracing::debug!("Bilibili: short link {} -> {}", url, target);
        }

        let video_id = Self::extract_video_id(&target).ok_or_else(|| {
            ResolveError::schema(Platform::Bilibili, format!("no BV/av id in {}", target))
        })?;
        let page = Self::page_index(&target);

        let view = self
            .get_json(&format!("{}?{}", VIEW_API, video_id.query()))
            .await?;
        let (mut raw, cid) = Self::parse_view(&view, page)?;

        let play = self
            .get_json(&format!(
                "{}?{}&cid={}&qn={}&fnver=0&fnval=0&otype=json&platform=html5&high_quality=1",
                PLAYURL_API,
                video_id.query(),
                cid,
                REQUESTED_QN
            ))
            .await?;
        raw.qualities = Self::parse_playurl(&play)?;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_from_urls() {
        assert_eq!(
            BilibiliResolver::extract_video_id("https://www.bilibili.com/video/BV1xx411c7mD/?spm_id_from=333"),
            Some(VideoId::Bvid("BV1xx411c7mD".into()))
        );
        assert_eq!(
            BilibiliResolver::extract_video_id("https://m.bilibili.com/video/av170001"),
            Some(VideoId::Aid(170001))
        );
        assert_eq!(BilibiliResolver::extract_video_id("https://b23.tv/AbCdEf"), None);
        assert_eq!(BilibiliResolver::page_index("https://www.bilibili.com/video/BV1x?p=3"), 3);
        assert_eq!(BilibiliResolver::page_index("https://www.bilibili.com/video/BV1x?p=0"), 1);
    }

    #[test]
    fn view_and_playurl() {
        let view = json!({"code":0,"message":"0","data":{
            "title":"how to bake bread","pic":"http://i0.hdslb.com/bfs/archive/cover.jpg","cid":111,
            "pages":[{"cid":111},{"cid":222}],
            "owner":{"mid":9876543,"name":"baker","face":"https://i1.hdslb.com/bfs/face/f.jpg"}
        }});
        let (raw, cid) = BilibiliResolver::parse_view(&view, 2).unwrap();
        assert_eq!(cid, 222);
        assert_eq!(raw.author.uid, "9876543");
        assert_eq!(raw.platform, Platform::Bilibili);

        let play = json!({"code":0,"data":{
            "quality":64,
            "accept_quality":[80,64,32,16],
            "accept_description":["高清 1080P","高清 720P","清晰 480P","流畅 360P"],
            "durl":[{"url":"https://upos-sz-mirror.bilivideo.com/v.mp4","size":123456}]
        }});
        let qualities = BilibiliResolver::parse_playurl(&play).unwrap();
        assert_eq!(qualities[0].label, "高清 720P");
        assert_eq!(qualities[0].size, Some(123456));

        let mut raw = raw;
        raw.qualities = qualities;
        let d = crate::core::normalizer::normalize(raw).unwrap();
        assert_eq!(d.video_url, "https://upos-sz-mirror.bilivideo.com/v.mp4");
    }

    #[test]
    fn error_codes() {
        let missing = json!({"code":-404,"message":"啥都木有"});
        assert_eq!(BilibiliResolver::parse_view(&missing, 1).unwrap_err().kind(), "NotFound");

        let hidden = json!({"code":62002,"message":"稿件不可见"});
        assert_eq!(BilibiliResolver::parse_view(&hidden, 1).unwrap_err().kind(), "NotFound");

        let risk = json!({"code":-352,"message":"风控校验失败"});
        assert_eq!(BilibiliResolver::parse_view(&risk, 1).unwrap_err().kind(), "ChallengeDetected");

        let odd = json!({"code":-400,"message":"请求错误"});
        assert_eq!(BilibiliResolver::parse_view(&odd, 1).unwrap_err().kind(), "SchemaMismatch");
    }

    #[test]
    fn playurl_without_durl() {
        let play = json!({"code":0,"data":{"quality":80,"dash":{}}});
        assert_eq!(BilibiliResolver::parse_playurl(&play).unwrap_err().kind(), "SchemaMismatch");
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Douyin,
    Kuaishou,
    Xhs,
    Weibo,
    Bilibili,
    Pipixia,
    Xigua,
}

impl Platform {
    pub const ALL: [Platform; 7] = [
        Platform::Douyin,
        Platform::Kuaishou,
        Platform::Xhs,
        Platform::Weibo,
        Platform::Bilibili,
        Platform::Pipixia,
        Platform::Xigua,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Douyin => "douyin",
            Platform::Kuaishou => "kuaishou",
            Platform::Xhs => "xhs",
            Platform::Weibo => "weibo",
            Platform::Bilibili => "bilibili",
            Platform::Pipixia => "pipixia",
            Platform::Xigua => "xigua",
        }
    }

    /// Hosts that serve share pages and short links for this platform.
    pub fn share_hosts(&self) -> &'static [&'static str] {
        match self {
            Platform::Douyin => &["douyin.com", "iesdouyin.com"],
            Platform::Kuaishou => &["kuaishou.com", "chenzhongtech.com", "gifshow.com"],
            Platform::Xhs => &["xiaohongshu.com", "xhslink.com"],
            Platform::Weibo => &["weibo.com", "weibo.cn"],
            Platform::Bilibili => &["bilibili.com", "b23.tv"],
            Platform::Pipixia => &["pipix.com"],
            Platform::Xigua => &["ixigua.com"],
        }
    }

    /// CDN hosts that serve this platform's images and videos.
    pub fn asset_hosts(&self) -> &'static [&'static str] {
        match self {
            Platform::Douyin => &[
                "douyinpic.com",
                "douyinvod.com",
                "douyincdn.com",
                "douyinstatic.com",
                "amemv.com",
                "zjcdn.com",
            ],
            Platform::Kuaishou => &["yximgs.com", "kwimgs.com", "kwaicdn.com", "kuaishou.com"],
            Platform::Xhs => &["xhscdn.com", "xiaohongshu.com"],
            Platform::Weibo => &["sinaimg.cn", "weibocdn.com", "weibo.com"],
            Platform::Bilibili => &["hdslb.com", "bilivideo.com", "bilivideo.cn", "bilibili.com"],
            Platform::Pipixia => &["pipix.com", "pstatp.com"],
            Platform::Xigua => &["ixigua.com", "toutiaoimg.com", "bytedanceapi.com"],
        }
    }

    /// Referer the platform's CDN expects before it serves an asset.
    pub fn referer(&self) -> &'static str {
        match self {
            Platform::Douyin => "https://www.douyin.com/",
            Platform::Kuaishou => "https://www.kuaishou.com/",
            Platform::Xhs => "https://www.xiaohongshu.com/",
            Platform::Weibo => "https://weibo.com/",
            Platform::Bilibili => "https://www.bilibili.com/",
            Platform::Pipixia => "https://h5.pipix.com/",
            Platform::Xigua => "https://www.ixigua.com/",
        }
    }

    pub fn from_url(url: &str) -> Option<Self> {
        let host = host_of(url)?;
        Self::ALL
            .into_iter()
            .find(|p| p.share_hosts().iter().any(|h| host_matches(&host, h)))
    }

    pub fn from_asset_url(url: &str) -> Option<Self> {
        let host = host_of(url)?;
        Self::ALL
            .into_iter()
            .find(|p| p.asset_hosts().iter().any(|h| host_matches(&host, h)))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown platform: {}", s))
    }
}

fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.to_lowercase())
}

/// `true` when `host` is `domain` itself or one of its subdomains.
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_urls_map_to_platforms() {
        assert_eq!(Platform::from_url("https://v.douyin.com/iRNBho6u/"), Some(Platform::Douyin));
        assert_eq!(Platform::from_url("https://www.iesdouyin.com/share/video/1/"), Some(Platform::Douyin));
        assert_eq!(Platform::from_url("https://v.kuaishou.com/abc"), Some(Platform::Kuaishou));
        assert_eq!(Platform::from_url("http://xhslink.com/a/xyz"), Some(Platform::Xhs));
        assert_eq!(Platform::from_url("https://m.weibo.cn/status/123"), Some(Platform::Weibo));
        assert_eq!(Platform::from_url("https://b23.tv/abc"), Some(Platform::Bilibili));
        assert_eq!(Platform::from_url("https://h5.pipix.com/s/abc/"), Some(Platform::Pipixia));
        assert_eq!(Platform::from_url("https://v.ixigua.com/abc/"), Some(Platform::Xigua));
    }

    #[test]
    fn lookalike_hosts_do_not_match() {
        assert_eq!(Platform::from_url("https://notdouyin.com/video/1"), None);
        assert_eq!(Platform::from_url("https://douyin.com.evil.net/video/1"), None);
        assert_eq!(Platform::from_url("not a url"), None);
    }

    #[test]
    fn asset_hosts_map_to_platforms() {
        assert_eq!(
            Platform::from_asset_url("https://wx3.sinaimg.cn/large/abc.jpg"),
            Some(Platform::Weibo)
        );
        assert_eq!(
            Platform::from_asset_url("https://i0.hdslb.com/bfs/archive/x.jpg"),
            Some(Platform::Bilibili)
        );
        assert_eq!(Platform::from_asset_url("https://example.com/x.jpg"), None);
    }

    #[test]
    fn platform_string_round_trip() {
        for p in Platform::ALL {
            assert_eq!(p.as_str().parse::<Platform>(), Ok(p));
            assert_eq!(serde_json::to_string(&p).unwrap(), format!("\"{}\"", p.as_str()));
        }
    }
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub schema_version: u32,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub asset_proxy: AssetProxySettings,
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub proxy: ProxySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Longest silence tolerated between two body chunks of a stream.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl NetworkSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_read_timeout_secs() -> u64 {
    45
}

fn default_max_redirects() -> usize {
    5
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            max_redirects: default_max_redirects(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Overrides the platform cache directory when set.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_cache_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_cache_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_cache_max_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_cache_max_age_secs() -> u64 {
    24 * 60 * 60
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: None,
            max_bytes: default_cache_max_bytes(),
            max_age_secs: default_cache_max_age_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetProxySettings {
    #[serde(default = "default_asset_max_bytes")]
    pub max_bytes: u64,
}

fn default_asset_max_bytes() -> u64 {
    10 * 1024 * 1024
}

impl Default for AssetProxySettings {
    fn default() -> Self {
        Self {
            max_bytes: default_asset_max_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_progress_interval_ms() -> u64 {
    250
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_proxy_type")]
    pub proxy_type: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_proxy_type() -> String {
    "http".into()
}

fn default_proxy_port() -> u16 {
    8080
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            proxy_type: default_proxy_type(),
            host: String::new(),
            port: default_proxy_port(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: 1,
            network: NetworkSettings::default(),
            cache: CacheSettings::default(),
            asset_proxy: AssetProxySettings::default(),
            download: DownloadSettings::default(),
            proxy: ProxySettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let s: AppSettings =
            serde_json::from_str(r#"{"schema_version":1,"network":{"max_redirects":3}}"#).unwrap();
        assert_eq!(s.network.max_redirects, 3);
        assert_eq!(s.network.connect_timeout_secs, 10);
        assert_eq!(s.cache.max_age_secs, 24 * 60 * 60);
        assert!(!s.proxy.enabled);
        assert_eq!(s.proxy.proxy_type, "http");
    }
}

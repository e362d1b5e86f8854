use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use futures::StreamExt;
use reqwest::header::REFERER;
use sha2::Digest;
use tokio::io::AsyncWriteExt;

use vidlink_core::models::settings::{CacheSettings, NetworkSettings};
use vidlink_core::platforms::Platform;

use crate::core::http_client::{self, DESKTOP_USER_AGENT};
use crate::error::{ResolveError, Result};

const ENTRY_EXT: &str = "mp4";
const TMP_EXT: &str = "tmp";

struct CacheEntry {
    path: PathBuf,
    modified: SystemTime,
    size: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvictionReport {
    pub removed: usize,
    pub freed_bytes: u64,
}

/// Local copies of referer-protected videos, keyed by a hash of the source URL.
///
/// Entries land under their final name only through a rename, so a reader
/// never sees a partial file. Concurrent misses for one URL share a lock and
/// produce a single download.
pub struct VideoCache {
    dir: PathBuf,
    max_bytes: u64,
    max_age: Duration,
    request_timeout: Duration,
    read_timeout: Duration,
    client: reqwest::Client,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl VideoCache {
    pub fn new(dir: PathBuf, settings: &CacheSettings, net: &NetworkSettings) -> Result<Self> {
        Ok(Self {
            dir,
            max_bytes: settings.max_bytes,
            max_age: Duration::from_secs(settings.max_age_secs),
            request_timeout: net.request_timeout(),
            read_timeout: net.read_timeout(),
            client: http_client::build(http_client::streaming_builder(net).user_agent(DESKTOP_USER_AGENT))?,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn key_for(url: &str) -> String {
        format!("{:x}", sha2::Sha256::digest(url.as_bytes()))
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", Self::key_for(url), ENTRY_EXT))
    }

    pub async fn cache(&self, url: &str) -> Result<PathBuf> {
        let path = self.path_for(url);
        if Self::touch_if_present(&path).await {
            tracing::debug!("[cache] hit {}", path.display());
            return Ok(path);
        }

        let key = Self::key_for(url);
        let lock = self.lock_for(&key);
        let guard = lock.lock().await;

        if Self::touch_if_present(&path).await {
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self
            .dir
            .join(format!("{}.{}.{}", key, uuid::Uuid::new_v4().simple(), TMP_EXT));

        let written = match self.fetch_to(url, &tmp).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                tracing::warn!("[cache] {} failed: {}", url, e);
                return Err(e);
            }
        };
        tokio::fs::rename(&tmp, &path).await?;
        tracing::info!("[cache] stored {} ({} bytes)", path.display(), written);

        drop(guard);
        drop(lock);
        self.release_lock(&key);

        if let Err(e) = self.evict(Some(&path)).await {
            tracing::warn!("[cache] eviction failed: {}", e);
        }
        Ok(path)
    }

    /// Removes entries older than the age limit, then the least recently
    /// used ones until the directory is back under 3/4 of the size budget.
    pub async fn evict(&self, protected: Option<&Path>) -> Result<EvictionReport> {
        let mut report = EvictionReport::default();
        let mut entries = match self.scan().await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };
        let now = SystemTime::now();

        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries.drain(..) {
            let age = now.duration_since(entry.modified).unwrap_or_default();
            if age > self.max_age
                && protected != Some(entry.path.as_path())
                && Self::remove(&entry, &mut report).await
            {
                continue;
            }
            if entry.path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXT) {
                kept.push(entry);
            }
        }

        let mut total: u64 = kept.iter().map(|e| e.size).sum();
        if total > self.max_bytes {
            let target = self.max_bytes / 4 * 3;
            kept.sort_by_key(|e| e.modified);
            for entry in &kept {
                if total <= target {
                    break;
                }
                if protected == Some(entry.path.as_path()) {
                    continue;
                }
                if Self::remove(entry, &mut report).await {
                    total = total.saturating_sub(entry.size);
                }
            }
        }

        if report.removed > 0 {
            tracing::info!(
                "[cache] evicted {} entries, freed {} bytes",
                report.removed,
                report.freed_bytes
            );
        }
        Ok(report)
    }

    async fn fetch_to(&self, url: &str, tmp: &Path) -> Result<u64> {
        let parsed = url::Url::parse(url)
            .map_err(|e| ResolveError::Download(format!("invalid url {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ResolveError::Download(format!("unsupported scheme in {}", url)));
        }

        let mut request = self.client.get(parsed);
        if let Some(platform) = Platform::from_asset_url(url) {
            request = request.header(REFERER, platform.referer());
        }
        let response = http_client::send_within(request, self.request_timeout).await?;
        if !response.status().is_success() {
            return Err(ResolveError::Download(format!("HTTP {} for {}", response.status(), url)));
        }
        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(ResolveError::Download(format!(
                    "{} bytes exceeds cache budget of {}",
                    len, self.max_bytes
                )));
            }
        }

        let file = tokio::fs::File::create(tmp).await?;
        let mut file = tokio::io::BufWriter::with_capacity(256 * 1024, file);
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();

        loop {
            match tokio::time::timeout(self.read_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => {
                    written += chunk.len() as u64;
                    if written > self.max_bytes {
                        return Err(ResolveError::Download(format!(
                            "body exceeds cache budget of {} bytes",
                            self.max_bytes
                        )));
                    }
                    file.write_all(&chunk).await?;
                }
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(None) => break,
                Err(_) => {
                    return Err(ResolveError::Network(format!(
                        "no data for {}s",
                        self.read_timeout.as_secs()
                    )))
                }
            }
        }

        file.flush().await?;
        file.get_ref().sync_all().await?;
        Ok(written)
    }

    async fn touch_if_present(path: &Path) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => {
                if let Err(e) = filetime::set_file_mtime(path, filetime::FileTime::now()) {
                    tracing::debug!("[cache] could not refresh mtime of {}: {}", path.display(), e);
                }
                true
            }
            _ => false,
        }
    }

    async fn scan(&self) -> std::io::Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if !matches!(ext, Some(ENTRY_EXT) | Some(TMP_EXT)) {
                continue;
            }
            let meta = match item.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            entries.push(CacheEntry {
                path,
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                size: meta.len(),
            });
        }
        Ok(entries)
    }

    async fn remove(entry: &CacheEntry, report: &mut EvictionReport) -> bool {
        match tokio::fs::remove_file(&entry.path).await {
            Ok(()) => {
                report.removed += 1;
                report.freed_bytes += entry.size;
                true
            }
            Err(e) => {
                tracing::warn!("[cache] could not remove {}: {}", entry.path.display(), e);
                false
            }
        }
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(key.to_string()).or_default().clone()
    }

    fn release_lock(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }
}

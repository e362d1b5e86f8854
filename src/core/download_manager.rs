use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, REFERER};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use vidlink_core::core::events::ProgressEmitter;
use vidlink_core::models::download::{DownloadProgress, DownloadStatus};
use vidlink_core::models::settings::{DownloadSettings, NetworkSettings};
use vidlink_core::platforms::Platform;

use crate::core::http_client::{self, DESKTOP_USER_AGENT};
use crate::error::{ResolveError, Result};
use crate::storage::db::Store;
use crate::storage::downloads::NewDownload;

const WRITE_BUFFER: usize = 256 * 1024;

/// Streams remote files to disk in the background, persisting a record and
/// pushing throttled progress for each one.
pub struct DownloadManager {
    client: reqwest::Client,
    store: Arc<Store>,
    emitter: Arc<dyn ProgressEmitter>,
    active: Arc<Mutex<HashMap<i64, CancellationToken>>>,
    progress_interval: Duration,
    request_timeout: Duration,
    read_timeout: Duration,
}

struct Transfer {
    id: i64,
    total: Option<u64>,
    save_path: PathBuf,
    store: Arc<Store>,
    emitter: Arc<dyn ProgressEmitter>,
    progress_interval: Duration,
    read_timeout: Duration,
}

impl DownloadManager {
    pub fn new(
        store: Arc<Store>,
        emitter: Arc<dyn ProgressEmitter>,
        net: &NetworkSettings,
        settings: &DownloadSettings,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client::build(http_client::streaming_builder(net).user_agent(DESKTOP_USER_AGENT))?,
            store,
            emitter,
            active: Arc::new(Mutex::new(HashMap::new())),
            progress_interval: Duration::from_millis(settings.progress_interval_ms),
            request_timeout: net.request_timeout(),
            read_timeout: net.read_timeout(),
        })
    }

    /// Returns once the response headers are in and the record exists; the
    /// body keeps streaming on a spawned task. Failures after this point are
    /// reported through the record and the progress channel only.
    pub async fn start_download(
        &self,
        user_id: i64,
        url: &str,
        save_path: &Path,
        title: &str,
        cover_url: &str,
    ) -> Result<i64> {
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

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Download(format!("HTTP {} for {}", status, url)));
        }
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/html"));
        if is_html {
            return Err(ResolveError::Download(format!(
                "server returned HTML instead of media for {}",
                url
            )));
        }
        let total = response.content_length();

        if let Some(parent) = save_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(save_path).await?;

        let id = self.store.create_download(&NewDownload {
            user_id,
            url: url.to_string(),
            title: title.to_string(),
            cover_url: cover_url.to_string(),
            file_path: save_path.to_string_lossy().into_owned(),
            total_size: total,
        })?;
        tracing::info!(
            "[download] #{} started {} -> {} ({} bytes)",
            id,
            url,
            save_path.display(),
            total.map(|t| t.to_string()).unwrap_or_else(|| "unknown".into())
        );

        let token = CancellationToken::new();
        self.lock_active().insert(id, token.clone());

        let transfer = Transfer {
            id,
            total,
            save_path: save_path.to_path_buf(),
            store: self.store.clone(),
            emitter: self.emitter.clone(),
            progress_interval: self.progress_interval,
            read_timeout: self.read_timeout,
        };
        let active = self.active.clone();
        tokio::spawn(async move {
            transfer.run(response, file, token).await;
            active
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&id);
        });

        Ok(id)
    }

    /// Stops a running download at the next chunk boundary. The record ends
    /// as `failed` with whatever reached the disk.
    pub fn cancel(&self, id: i64) -> bool {
        match self.lock_active().get(&id) {
            Some(token) => {
                tracing::info!("[download] #{} cancel requested", id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<i64, CancellationToken>> {
        self.active.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Transfer {
    async fn run(self, response: reqwest::Response, file: tokio::fs::File, token: CancellationToken) {
        let mut file = tokio::io::BufWriter::with_capacity(WRITE_BUFFER, file);
        let outcome = self.pump(response, &mut file, &token).await;
        let flushed = file.flush().await;

        let on_disk = match tokio::fs::metadata(&self.save_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!("[download] #{} cannot stat {}: {}", self.id, self.save_path.display(), e);
                0
            }
        };

        let outcome = outcome.and_then(|()| flushed.map_err(|e| format!("flush failed: {}", e)));
        let outcome = outcome.and_then(|()| match self.total {
            Some(total) if on_disk < total => Err(format!(
                "connection closed after {} of {} bytes",
                on_disk, total
            )),
            _ => Ok(()),
        });

        let status = match &outcome {
            Ok(()) => {
                tracing::info!("[download] #{} completed ({} bytes)", self.id, on_disk);
                DownloadStatus::Completed
            }
            Err(reason) => {
                tracing::warn!("[download] #{} failed at {} bytes: {}", self.id, on_disk, reason);
                DownloadStatus::Failed
            }
        };

        let store = self.store.clone();
        let id = self.id;
        match tokio::task::spawn_blocking(move || store.finish_download(id, status, on_disk)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("[download] #{} could not finalize record: {}", id, e),
            Err(e) => tracing::warn!("[download] #{} finalize task failed: {}", id, e),
        }
        self.emit(on_disk, status);
    }

    /// Copies the body into `file`, flushing before each progress tick so a
    /// reported count is always already on disk.
    async fn pump(
        &self,
        response: reqwest::Response,
        file: &mut tokio::io::BufWriter<tokio::fs::File>,
        token: &CancellationToken,
    ) -> std::result::Result<(), String> {
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut last_tick = Instant::now();

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return Err("cancelled".into()),
                next = tokio::time::timeout(self.read_timeout, stream.next()) => next,
            };

            match next {
                Ok(Some(Ok(chunk))) => {
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| format!("write error (disk full?): {}", e))?;
                    written += chunk.len() as u64;

                    if last_tick.elapsed() >= self.progress_interval {
                        file.flush().await.map_err(|e| format!("flush failed: {}", e))?;
                        self.persist_progress(written).await;
                        self.emit(written, DownloadStatus::Downloading);
                        last_tick = Instant::now();
                    }
                }
                Ok(Some(Err(e))) => return Err(format!("stream error: {}", e)),
                Ok(None) => return Ok(()),
                Err(_) => {
                    return Err(format!(
                        "no data received for {}s",
                        self.read_timeout.as_secs()
                    ))
                }
            }
        }
    }

    async fn persist_progress(&self, written: u64) {
        let store = self.store.clone();
        let id = self.id;
        match tokio::task::spawn_blocking(move || store.update_download_progress(id, written)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("[download] #{} progress not persisted: {}", id, e),
            Err(e) => tracing::warn!("[download] #{} progress task failed: {}", id, e),
        }
    }

    fn emit(&self, downloaded: u64, status: DownloadStatus) {
        self.emitter.emit_progress(&DownloadProgress {
            id: self.id,
            downloaded,
            total: self.total,
            status,
        });
    }
}

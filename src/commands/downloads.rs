use std::path::PathBuf;

use serde::Serialize;

use vidlink_core::models::download::DownloadRecord;

use super::to_message;
use crate::error::ResolveError;
use crate::AppState;

#[derive(Clone, Serialize)]
pub struct DownloadStarted {
    pub id: i64,
    pub title: String,
}

/// Starts a background download; progress arrives on the state's emitter.
pub async fn download_file(
    state: &AppState,
    user_id: i64,
    url: String,
    save_path: String,
    title: String,
    cover_url: String,
) -> Result<DownloadStarted, String> {
    let id = state
        .downloads
        .start_download(user_id, &url, &PathBuf::from(save_path), &title, &cover_url)
        .await
        .map_err(to_message)?;
    Ok(DownloadStarted { id, title })
}

pub fn cancel_download(state: &AppState, id: i64) -> Result<bool, String> {
    Ok(state.downloads.cancel(id))
}

pub fn get_downloads(state: &AppState, user_id: i64) -> Result<Vec<DownloadRecord>, String> {
    state
        .store
        .list_downloads(user_id)
        .map_err(|e| to_message(e.into()))
}

/// Drops the record, and the file too when asked. A running transfer is not
/// stopped by this; call `cancel_download` first for that.
pub async fn remove_download_record(
    state: &AppState,
    id: i64,
    delete_file: bool,
) -> Result<(), String> {
    let record = state
        .store
        .get_download(id)
        .map_err(|e| to_message(e.into()))?;

    if delete_file {
        match tokio::fs::remove_file(&record.file_path).await {
            Ok(()) => tracing::info!("[download] #{} removed {}", id, record.file_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(to_message(ResolveError::Download(format!(
                    "cannot delete {}: {}",
                    record.file_path, e
                ))))
            }
        }
    }

    state
        .store
        .remove_download(id)
        .map(|_| ())
        .map_err(|e| to_message(e.into()))
}

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use vidlink_core::models::download::{DownloadRecord, DownloadStatus};

use super::db::{parse_timestamp, Store, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct NewDownload {
    pub user_id: i64,
    pub url: String,
    pub title: String,
    pub cover_url: String,
    pub file_path: String,
    pub total_size: Option<u64>,
}

const SELECT_DOWNLOAD: &str = "SELECT id, user_id, url, title, cover_url, file_path, status,
        total_size, downloaded_size, created_at
 FROM downloads";

impl Store {
    /// Inserts a fresh record in the `downloading` state and returns its id.
    pub fn create_download(&self, new: &NewDownload) -> StoreResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO downloads
                (user_id, url, title, cover_url, file_path, status, total_size, downloaded_size, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8)",
            params![
                new.user_id,
                new.url,
                new.title,
                new.cover_url,
                new.file_path,
                DownloadStatus::Downloading.as_str(),
                new.total_size.map(|v| v as i64),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Records progress for a running download. The stored count never moves
    /// backwards and finalized records are left untouched.
    pub fn update_download_progress(&self, id: i64, downloaded: u64) -> StoreResult<()> {
        self.conn()?.execute(
            "UPDATE downloads
             SET downloaded_size = MAX(downloaded_size, ?2)
             WHERE id = ?1 AND status = ?3",
            params![id, downloaded as i64, DownloadStatus::Downloading.as_str()],
        )?;
        Ok(())
    }

    /// Moves a running download to its terminal status.
    ///
    /// Returns `false` when the record was already finalized or removed.
    pub fn finish_download(
        &self,
        id: i64,
        status: DownloadStatus,
        downloaded: u64,
    ) -> StoreResult<bool> {
        let affected = if status == DownloadStatus::Completed {
            self.conn()?.execute(
                "UPDATE downloads
                 SET status = ?2, downloaded_size = ?3, total_size = COALESCE(total_size, ?3)
                 WHERE id = ?1 AND status = ?4",
                params![
                    id,
                    status.as_str(),
                    downloaded as i64,
                    DownloadStatus::Downloading.as_str()
                ],
            )?
        } else {
            self.conn()?.execute(
                "UPDATE downloads
                 SET status = ?2, downloaded_size = ?3
                 WHERE id = ?1 AND status = ?4",
                params![
                    id,
                    status.as_str(),
                    downloaded as i64,
                    DownloadStatus::Downloading.as_str()
                ],
            )?
        };
        Ok(affected > 0)
    }

    pub fn get_download(&self, id: i64) -> StoreResult<DownloadRecord> {
        self.conn()?
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_DOWNLOAD),
                params![id],
                row_to_download,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    /// Newest first.
    pub fn list_downloads(&self, user_id: i64) -> StoreResult<Vec<DownloadRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE user_id = ?1 ORDER BY id DESC",
            SELECT_DOWNLOAD
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_download)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Deletes the record and hands back its file path so the caller can
    /// decide what to do with the file.
    pub fn remove_download(&self, id: i64) -> StoreResult<String> {
        let conn = self.conn()?;
        let path: Option<String> = conn
            .query_row(
                "SELECT file_path FROM downloads WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let path = path.ok_or(StoreError::NotFound)?;
        conn.execute("DELETE FROM downloads WHERE id = ?1", params![id])?;
        Ok(path)
    }
}

fn row_to_download(row: &rusqlite::Row<'_>) -> rusqlite::Result<DownloadRecord> {
    let status_str: String = row.get(6)?;
    let status = status_str.parse::<DownloadStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;
    let total_size: Option<i64> = row.get(7)?;
    let downloaded_size: i64 = row.get(8)?;
    let created_at: String = row.get(9)?;

    Ok(DownloadRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        cover_url: row.get(4)?,
        file_path: row.get(5)?,
        status,
        total_size: total_size.map(|v| v.max(0) as u64),
        downloaded_size: downloaded_size.max(0) as u64,
        created_at: parse_timestamp(9, &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(user_id: i64, total: Option<u64>) -> NewDownload {
        NewDownload {
            user_id,
            url: "https://cdn.example.com/v.mp4".into(),
            title: "clip".into(),
            cover_url: String::new(),
            file_path: "/tmp/clip.mp4".into(),
            total_size: total,
        }
    }

    #[test]
    fn new_record_starts_downloading_at_zero() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_download(&sample(1, Some(100))).unwrap();
        let rec = store.get_download(id).unwrap();
        assert_eq!(rec.status, DownloadStatus::Downloading);
        assert_eq!(rec.downloaded_size, 0);
        assert_eq!(rec.total_size, Some(100));
    }

    #[test]
    fn progress_never_decreases() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_download(&sample(1, None)).unwrap();
        store.update_download_progress(id, 50).unwrap();
        store.update_download_progress(id, 20).unwrap();
        assert_eq!(store.get_download(id).unwrap().downloaded_size, 50);
    }

    #[test]
    fn finalize_happens_once() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_download(&sample(1, None)).unwrap();
        assert!(store.finish_download(id, DownloadStatus::Completed, 70).unwrap());
        assert!(!store.finish_download(id, DownloadStatus::Failed, 10).unwrap());

        let rec = store.get_download(id).unwrap();
        assert_eq!(rec.status, DownloadStatus::Completed);
        assert_eq!(rec.downloaded_size, 70);
        assert_eq!(rec.total_size, Some(70));

        store.update_download_progress(id, 90).unwrap();
        assert_eq!(store.get_download(id).unwrap().downloaded_size, 70);
    }

    #[test]
    fn failed_keeps_unknown_total() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_download(&sample(1, None)).unwrap();
        store.finish_download(id, DownloadStatus::Failed, 12).unwrap();
        let rec = store.get_download(id).unwrap();
        assert_eq!(rec.total_size, None);
        assert_eq!(rec.downloaded_size, 12);
    }

    #[test]
    fn list_is_per_user_newest_first() {
        let store = Store::open_in_memory().unwrap();
        let a = store.create_download(&sample(1, None)).unwrap();
        let b = store.create_download(&sample(1, None)).unwrap();
        store.create_download(&sample(2, None)).unwrap();

        let ids: Vec<i64> = store
            .list_downloads(1)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[test]
    fn remove_returns_path_then_not_found() {
        let store = Store::open_in_memory().unwrap();
        let id = store.create_download(&sample(1, None)).unwrap();
        assert_eq!(store.remove_download(id).unwrap(), "/tmp/clip.mp4");
        assert!(matches!(store.remove_download(id), Err(StoreError::NotFound)));
        assert!(matches!(store.get_download(id), Err(StoreError::NotFound)));
    }
}

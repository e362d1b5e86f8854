use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use vidlink_core::models::favorite::{Favorite, NewFavorite};

use super::db::{is_unique_violation, parse_timestamp, Store, StoreError, StoreResult};

const SELECT_FAVORITE: &str =
    "SELECT id, user_id, url, title, platform, cover_url, author_name, created_at FROM favorites";

impl Store {
    /// Fails with [`StoreError::Duplicate`] if the user already saved this url.
    pub fn add_favorite(&self, new: &NewFavorite) -> StoreResult<Favorite> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO favorites (user_id, url, title, platform, cover_url, author_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.user_id,
                new.url,
                new.title,
                new.platform,
                new.cover_url,
                new.author_name,
                Utc::now().to_rfc3339(),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Duplicate(new.url.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("{} WHERE id = ?1", SELECT_FAVORITE),
            params![id],
            row_to_favorite,
        )
        .map_err(StoreError::from)
    }

    pub fn remove_favorite(&self, id: i64) -> StoreResult<bool> {
        let affected = self
            .conn()?
            .execute("DELETE FROM favorites WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    /// `None`, an empty string or `"all"` means every platform.
    pub fn get_favorites(&self, user_id: i64, platform: Option<&str>) -> StoreResult<Vec<Favorite>> {
        let platform = platform
            .map(str::trim)
            .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case("all"));

        let conn = self.conn()?;
        let mut favorites = Vec::new();
        match platform {
            Some(p) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE user_id = ?1 AND platform = ?2 ORDER BY id DESC",
                    SELECT_FAVORITE
                ))?;
                let rows = stmt.query_map(params![user_id, p], row_to_favorite)?;
                for row in rows {
                    favorites.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE user_id = ?1 ORDER BY id DESC",
                    SELECT_FAVORITE
                ))?;
                let rows = stmt.query_map(params![user_id], row_to_favorite)?;
                for row in rows {
                    favorites.push(row?);
                }
            }
        }
        Ok(favorites)
    }

    pub fn is_favorited(&self, user_id: i64, url: &str) -> StoreResult<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT id FROM favorites WHERE user_id = ?1 AND url = ?2",
                params![user_id, url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn row_to_favorite(row: &rusqlite::Row<'_>) -> rusqlite::Result<Favorite> {
    let created_at: String = row.get(7)?;
    Ok(Favorite {
        id: row.get(0)?,
        user_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        platform: row.get(4)?,
        cover_url: row.get(5)?,
        author_name: row.get(6)?,
        created_at: parse_timestamp(7, &created_at)?,
    })
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Favorite {
    pub id: i64,
    pub user_id: i64,
    pub url: String,
    pub title: String,
    pub platform: String,
    pub cover_url: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFavorite {
    pub user_id: i64,
    pub url: String,
    pub title: String,
    pub platform: String,
    #[serde(default)]
    pub cover_url: String,
    #[serde(default)]
    pub author_name: String,
}

use vidlink_core::models::favorite::{Favorite, NewFavorite};

use super::to_message;
use crate::AppState;

pub fn get_favorites(
    state: &AppState,
    user_id: i64,
    platform: Option<String>,
) -> Result<Vec<Favorite>, String> {
    state
        .store
        .get_favorites(user_id, platform.as_deref())
        .map_err(|e| to_message(e.into()))
}

pub fn add_favorite(state: &AppState, favorite: NewFavorite) -> Result<Favorite, String> {
    state
        .store
        .add_favorite(&favorite)
        .map_err(|e| to_message(e.into()))
}

pub fn remove_favorite(state: &AppState, id: i64) -> Result<bool, String> {
    state
        .store
        .remove_favorite(id)
        .map_err(|e| to_message(e.into()))
}

pub fn is_favorited(state: &AppState, user_id: i64, url: String) -> Result<bool, String> {
    state
        .store
        .is_favorited(user_id, &url)
        .map_err(|e| to_message(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support;

    #[test]
    fn favorite_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(dir.path());
        let url = "https://www.bilibili.com/video/BV1xx411c7mD".to_string();

        let saved = add_favorite(
            &state,
            NewFavorite {
                user_id: 1,
                url: url.clone(),
                title: "clip".into(),
                platform: "bilibili".into(),
                cover_url: String::new(),
                author_name: "up".into(),
            },
        )
        .unwrap();

        let listed = get_favorites(&state, 1, Some("bilibili".into())).unwrap();
        assert_eq!(listed.iter().filter(|f| f.url == url).count(), 1);
        assert!(is_favorited(&state, 1, url.clone()).unwrap());

        assert!(remove_favorite(&state, saved.id).unwrap());
        assert!(!is_favorited(&state, 1, url).unwrap());
    }
}

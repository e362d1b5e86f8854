use std::path::{Path, PathBuf};

use vidlink_core::models::settings::AppSettings;

const SETTINGS_FILE: &str = "settings.json";

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE)
}

/// Missing, unreadable or malformed settings fall back to defaults.
pub fn load_settings(data_dir: &Path) -> AppSettings {
    let path = settings_path(data_dir);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return AppSettings::default(),
    };

    match serde_json::from_str::<AppSettings>(&raw) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Ignoring malformed {}: {}", path.display(), e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(data_dir: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let json = serde_json::to_string_pretty(settings)?;
    let path = settings_path(data_dir);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings(dir.path());
        assert_eq!(s.network.max_redirects, 5);
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = AppSettings::default();
        s.cache.max_bytes = 1234;
        s.download.progress_interval_ms = 50;
        save_settings(dir.path(), &s).unwrap();

        let loaded = load_settings(dir.path());
        assert_eq!(loaded.cache.max_bytes, 1234);
        assert_eq!(loaded.download.progress_interval_ms, 50);
    }

    #[test]
    fn garbage_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(settings_path(dir.path()), "{not json").unwrap();
        assert_eq!(load_settings(dir.path()).asset_proxy.max_bytes, 10 * 1024 * 1024);
    }
}

use serde_json::Value;

use vidlink_core::models::settings::AppSettings;

use crate::storage::config;
use crate::AppState;

/// Settings as stored on disk. Changes apply from the next start.
pub fn get_settings(state: &AppState) -> Result<AppSettings, String> {
    Ok(config::load_settings(&state.data_dir))
}

pub fn update_settings(state: &AppState, partial: String) -> Result<AppSettings, String> {
    let current = config::load_settings(&state.data_dir);
    let patch: Value = serde_json::from_str(&partial).map_err(|e| format!("Invalid JSON: {}", e))?;
    let mut merged = serde_json::to_value(&current).map_err(|e| format!("Serialize: {}", e))?;
    merge_json(&mut merged, &patch);
    let updated: AppSettings =
        serde_json::from_value(merged).map_err(|e| format!("Deserialize: {}", e))?;
    config::save_settings(&state.data_dir, &updated).map_err(|e| format!("Save: {}", e))?;
    Ok(updated)
}

pub fn reset_settings(state: &AppState) -> Result<AppSettings, String> {
    let defaults = AppSettings::default();
    config::save_settings(&state.data_dir, &defaults).map_err(|e| format!("Save: {}", e))?;
    Ok(defaults)
}

fn merge_json(base: &mut Value, patch: &Value) {
    let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) else {
        return;
    };
    for (key, value) in patch_obj {
        match base_obj.get_mut(key) {
            Some(existing) if existing.is_object() && value.is_object() => merge_json(existing, value),
            _ => {
                base_obj.insert(key.clone(), value.clone());
            }
        }
    }
}

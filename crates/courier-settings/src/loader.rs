//! Settings loading: compiled defaults ← JSON file ← `COURIER_*` env.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::types::CourierSettings;

/// Settings loading failures.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON for the schema.
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Default settings file location: `~/.courier/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".courier").join("settings.json")
}

/// Load settings from the default path with env overrides applied.
pub fn load_settings() -> Result<CourierSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env overrides applied.
///
/// A missing file is not an error: defaults are used. A present but
/// malformed file is an error so typos do not silently revert settings.
pub fn load_settings_from_path(path: &Path) -> Result<CourierSettings> {
    let mut merged = serde_json::to_value(CourierSettings::default())
        .expect("default settings serialize");
    if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let file: Value = serde_json::from_str(&raw)?;
        merged = deep_merge(merged, file);
    }
    let mut settings: CourierSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Recursively merge `overlay` onto `base`; non-object overlay values win.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `COURIER_*` environment overrides (highest priority layer).
fn apply_env_overrides(settings: &mut CourierSettings) {
    if let Ok(port) = std::env::var("COURIER_PORT") {
        match port.parse::<u16>() {
            Ok(port) => settings.server.port = port,
            Err(_) => tracing::warn!(value = %port, "ignoring non-numeric COURIER_PORT"),
        }
    }
    if let Ok(bind) = std::env::var("COURIER_BIND") {
        settings.server.bind = bind;
    }
    if let Ok(url) = std::env::var("COURIER_WEBHOOK_URL") {
        settings.webhook.url = url;
    }
    if let Ok(key) = std::env::var("COURIER_WEBHOOK_API_KEY") {
        settings.webhook.api_key = key;
    }
    if let Ok(dir) = std::env::var("COURIER_AUTH_DIR") {
        settings.gateway.auth_dir = dir;
    }
}

//! # courier-settings
//!
//! Configuration management with layered sources for the Courier gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`CourierSettings::default()`], mirroring the
//!    service's historical constants (port 5005, 5s reconnect delay, 3s QR
//!    wait, country code 62)
//! 2. **User file** — `~/.courier/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `COURIER_*` overrides (highest priority)
//!
//! The global singleton is reloadable: [`reload_settings_from_path`] swaps
//! the cached value so subsequent [`get_settings`] calls return fresh data.

#![deny(unsafe_code)]

pub mod loader;
pub mod types;

pub use loader::{
    deep_merge, load_settings, load_settings_from_path, settings_path, Result, SettingsError,
};
pub use types::*;

use std::path::Path;
use std::sync::{Arc, RwLock};

/// Global settings singleton.
///
/// `RwLock<Option<Arc<…>>>` instead of `OnceLock` so the cached value can
/// be swapped on reload. Reads are cheap (shared lock + `Arc::clone`).
static SETTINGS: RwLock<Option<Arc<CourierSettings>>> = RwLock::new(None);

/// Get the global settings instance.
///
/// On first call, loads from `~/.courier/settings.json` with env overrides.
/// If loading fails, returns compiled defaults. Returns an `Arc` so callers
/// hold a consistent snapshot even if another thread reloads concurrently.
pub fn get_settings() -> Arc<CourierSettings> {
    {
        let guard = SETTINGS.read().expect("settings lock poisoned");
        if let Some(ref s) = *guard {
            return Arc::clone(s);
        }
    }

    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    // Double-check after acquiring the write lock
    if let Some(ref s) = *guard {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            CourierSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Initialize the global settings with a specific value.
///
/// Replaces any previously cached settings. Used by the server binary once
/// the settings path is known, and by tests.
pub fn init_settings(settings: CourierSettings) {
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(Arc::new(settings));
}

/// Reload settings from a specific file path, swapping the global cache.
pub fn reload_settings_from_path(path: &Path) {
    let new = Arc::new(match load_settings_from_path(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, ?path, "failed to reload settings, falling back to defaults");
            CourierSettings::default()
        }
    });
    let mut guard = SETTINGS.write().expect("settings lock poisoned");
    *guard = Some(new);
    tracing::info!(?path, "settings reloaded from disk");
}

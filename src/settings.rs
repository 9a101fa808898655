//! Client settings.
//!
//! The original variants hardcoded the backend origin; here it is a JSON
//! settings file under the user config directory with an environment
//! override, so deployments can point at any backend.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.json";

/// Environment variable overriding the configured backend origin.
pub const BACKEND_URL_ENV: &str = "QUANTUMVIZ_BACKEND_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Origin of the QuantumViz backend service.
    pub backend_url: String,

    /// Per-request timeout for backend calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("quantumviz-voice").join(SETTINGS_FILE_NAME))
}

/// Load settings from the default location, falling back to defaults on any
/// problem, then apply environment overrides.
pub fn load() -> Settings {
    let mut settings = match settings_path() {
        Some(path) => load_from(&path),
        None => {
            tracing::warn!("could not determine config directory; using default settings");
            Settings::default()
        }
    };

    if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
        if !url.is_empty() {
            settings.backend_url = url;
        }
    }

    settings
}

pub fn load_from(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<Settings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("settings: failed to parse {:?}: {}", path, e);
                Settings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
        Err(e) => {
            tracing::warn!("settings: failed to read {:?}: {}", path, e);
            Settings::default()
        }
    }
}

pub fn save(settings: &Settings) -> Result<(), String> {
    let path = settings_path().ok_or_else(|| "Could not determine config directory".to_string())?;
    save_to(&path, settings)
}

pub fn save_to(path: &Path, settings: &Settings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write atomically: write to a temp file in the same directory, then
    // rename, so a crash mid-write cannot leave a corrupt settings.json.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // On Unix, rename atomically replaces the destination. On Windows it
    // fails if the destination exists, so remove it first.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing settings file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_the_original_backend_origin() {
        let settings = Settings::default();
        assert_eq!(settings.backend_url, "http://localhost:8080");
        assert_eq!(settings.request_timeout_secs, 30);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_from(&dir.path().join("nope.json"));
        assert_eq!(settings.backend_url, Settings::default().backend_url);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();
        let settings = load_from(&path);
        assert_eq!(settings.backend_url, Settings::default().backend_url);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let settings = Settings {
            backend_url: "http://quantum.example:9000".to_string(),
            request_timeout_secs: 5,
        };
        save_to(&path, &settings).unwrap();
        let loaded = load_from(&path);
        assert_eq!(loaded.backend_url, settings.backend_url);
        assert_eq!(loaded.request_timeout_secs, 5);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{ "backend_url": "http://other:1234" }"#).unwrap();
        let settings = load_from(&path);
        assert_eq!(settings.backend_url, "http://other:1234");
        assert_eq!(settings.request_timeout_secs, 30);
    }
}

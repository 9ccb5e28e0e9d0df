//! Settings persistence under the platform config directory.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use shared::settings::AppSettings;
use std::fs;
use std::path::{Path, PathBuf};

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "companion").map(|dirs| dirs.config_dir().join("settings.json"))
}

/// Load settings from `path`, or the platform default location when none is
/// given. A missing file yields defaults, written back so there is a file to
/// edit.
pub fn load_settings(path: Option<&Path>) -> Result<AppSettings> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(AppSettings::default()),
        },
    };
    if !path.exists() {
        let settings = AppSettings::default();
        if let Err(e) = save_settings(&path, &settings) {
            tracing::warn!("could not write default settings to {}: {}", path.display(), e);
        }
        return Ok(settings);
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read settings from {}", path.display()))?;
    let settings = serde_json::from_str(&raw)
        .with_context(|| format!("invalid settings file {}", path.display()))?;
    Ok(settings)
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults_and_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.endpoints.len(), 5);
        assert!(path.exists());
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = AppSettings::default();
        settings.model = "[Cerebras] llama3.1-8b".to_string();
        settings.continuous_dialogue = true;
        save_settings(&path, &settings).unwrap();

        let loaded = load_settings(Some(&path)).unwrap();
        assert_eq!(loaded.model, "[Cerebras] llama3.1-8b");
        assert!(loaded.continuous_dialogue);
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_silent_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_settings(Some(&path)).is_err());
    }
}

//! Local UI preferences kept next to the executable as JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("не удалось записать настройки в {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("не удалось сериализовать настройки: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("неизвестный параметр '{0}'")]
    UnknownKey(String),
    #[error("некорректное значение '{value}' для параметра {key}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub theme: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            width: 800,
            height: 600,
            fullscreen: false,
            language: "ru".to_string(),
        }
    }
}

impl Settings {
    /// Reads settings from `path`. A missing or unreadable file gives the defaults.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn!(error = %err, path = %path.display(), "не удалось прочитать настройки");
                return Self::default();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|err| {
            warn!(error = %err, path = %path.display(), "файл настроек повреждён, используются значения по умолчанию");
            Self::default()
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        let invalid = || SettingsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "theme" => self.theme = value.to_string(),
            "language" => self.language = value.to_string(),
            "width" => self.width = value.parse().map_err(|_| invalid())?,
            "height" => self.height = value.parse().map_err(|_| invalid())?,
            "fullscreen" => self.fullscreen = value.parse().map_err(|_| invalid())?,
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.set("theme", "dark").unwrap();
        settings.set("width", "1280").unwrap();
        settings.set("fullscreen", "true").unwrap();
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded, settings);
        assert_eq!(loaded.language, "ru");
    }

    #[test]
    fn missing_or_broken_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Settings::load(dir.path().join("absent.json")), Settings::default());

        let broken = dir.path().join("settings.json");
        fs::write(&broken, "{theme: ").unwrap();
        assert_eq!(Settings::load(&broken), Settings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"language":"en"}"#).unwrap();
        let loaded = Settings::load(&path);
        assert_eq!(loaded.language, "en");
        assert_eq!(loaded.width, 800);
    }

    #[test]
    fn set_rejects_unknown_keys_and_bad_values() {
        let mut settings = Settings::default();
        assert!(matches!(settings.set("font", "x"), Err(SettingsError::UnknownKey(_))));
        assert!(matches!(
            settings.set("height", "tall"),
            Err(SettingsError::InvalidValue { .. })
        ));
        assert_eq!(settings.height, 600);
    }
}

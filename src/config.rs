use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const APP_DIR: &str = "webtoon-shelf";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_library_dir")]
    pub library_dir: PathBuf,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Episode workers per download job. `None` picks half the host's
    /// logical processors.
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_library_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_base_url() -> String {
    "https://comic.naver.com".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            library_dir: default_library_dir(),
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            workers: None,
        }
    }
}

pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("settings.json")
}

impl Settings {
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    /// Falls back to defaults when the file is missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Settings::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("ignoring malformed settings at {}: {}", path.display(), e);
                    Settings::default()
                }
            },
            Err(e) => {
                log::warn!("could not read settings at {}: {}", path.display(), e);
                Settings::default()
            }
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = settings_path();
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| Error::write(dir, e))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| Error::write(path, e))
    }

    pub fn worker_count(&self) -> usize {
        self.workers.filter(|&n| n > 0).unwrap_or_else(default_workers)
    }
}

/// Half the logical processors, never less than one.
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus / 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("nope.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "library_dir": "/tmp/toons", "workers": 3 }"#).unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.library_dir, PathBuf::from("/tmp/toons"));
        assert_eq!(settings.worker_count(), 3);
        assert_eq!(settings.base_url, "https://comic.naver.com");
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            workers: Some(2),
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn test_worker_policy() {
        assert!(default_workers() >= 1);
        let settings = Settings {
            workers: Some(0),
            ..Settings::default()
        };
        assert_eq!(settings.worker_count(), default_workers());
    }
}

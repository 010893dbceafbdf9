use crate::errors::{AppError, AppResult};
use crate::store::merge_json;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "REQUEST_TRACKER_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "request-tracker-data";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerSettings {
    pub page_size: usize,
    pub check_interval_seconds: u64,
    pub sound_enabled: bool,
    pub desktop_notifications_enabled: bool,
    pub recent_limit: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            page_size: crate::filter::DEFAULT_PAGE_SIZE,
            check_interval_seconds: 60,
            sound_enabled: true,
            desktop_notifications_enabled: true,
            recent_limit: crate::stats::DEFAULT_RECENT_LIMIT,
        }
    }
}

impl TrackerSettings {
    /// Reads the YAML settings file. A missing file yields defaults; a
    /// malformed one is logged and also yields defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path)
            .map_err(AppError::from)
            .and_then(|raw| serde_yaml::from_str::<Self>(&raw).map_err(AppError::from))
        {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(path = %path.to_string_lossy(), error = %error, "invalid settings file; using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| AppError::Io(error.to_string()))?;
        }
        let raw = serde_yaml::to_string(self)?;
        fs::write(path, raw).map_err(|error| AppError::Io(error.to_string()))
    }

    pub fn merged(&self, update: serde_json::Value) -> AppResult<Self> {
        let mut merged = serde_json::to_value(self)?;
        merge_json(&mut merged, update);
        let settings: Self =
            serde_json::from_value(merged).map_err(|error| AppError::Validation(error.to_string()))?;
        Ok(settings.normalized())
    }

    fn normalized(mut self) -> Self {
        self.page_size = self.page_size.max(1);
        self.check_interval_seconds = self.check_interval_seconds.max(1);
        self
    }
}

/// File locations under the data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolves the data directory from `REQUEST_TRACKER_DATA_DIR`. The flag
    /// is true when the default was used.
    pub fn from_env() -> (Self, bool) {
        match std::env::var(DATA_DIR_ENV) {
            Ok(value) if !value.trim().is_empty() => (Self::new(PathBuf::from(value)), false),
            _ => (Self::new(PathBuf::from(DEFAULT_DATA_DIR)), true),
        }
    }

    pub fn database(&self) -> PathBuf {
        self.root.join("tracker.sqlite")
    }

    pub fn settings(&self) -> PathBuf {
        self.root.join("settings.yaml")
    }

    pub fn snapshot(&self) -> PathBuf {
        self.root.join("snapshot.json")
    }

    pub fn logs(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn exports(&self) -> PathBuf {
        self.root.join("exports")
    }
}

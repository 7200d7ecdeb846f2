use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    api::DEFAULT_API_BASE_URL,
    rollcall::state::{clamp_roll_speed, DEFAULT_ROLL_SPEED_MS},
};

pub const API_BASE_URL_ENV: &str = "ROLLCALL_API_BASE_URL";
pub const TOKEN_ENV: &str = "ROLLCALL_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub api_base_url: String,
    pub token: Option<String>,
    pub roll_speed_ms: u64,
    pub allow_repeat: bool,
    /// Local SQLite file; defaults to `rollcall.sqlite3` next to the settings.
    pub database_path: Option<PathBuf>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            token: None,
            roll_speed_ms: DEFAULT_ROLL_SPEED_MS,
            allow_repeat: false,
            database_path: None,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

/// `<data dir>/rollcall`, falling back to the working directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rollcall")
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(data) => data,
                Err(err) => {
                    log::warn!(
                        "Ignoring malformed settings at {}: {}",
                        path.display(),
                        err
                    );
                    UserSettings::default()
                }
            }
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Stored settings with environment overrides applied.
    pub fn effective(&self) -> UserSettings {
        let mut settings = self.read().clone();
        if let Ok(url) = env::var(API_BASE_URL_ENV) {
            if !url.trim().is_empty() {
                settings.api_base_url = url;
            }
        }
        if let Ok(token) = env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                settings.token = Some(token);
            }
        }
        settings.roll_speed_ms = clamp_roll_speed(settings.roll_speed_ms);
        settings
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.read().database_path {
            Some(path) => path.clone(),
            None => self
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
                .join("rollcall.sqlite3"),
        }
    }

    pub fn update(&self, apply: impl FnOnce(&mut UserSettings)) -> Result<UserSettings> {
        let mut guard = self.write();
        apply(&mut guard);
        guard.roll_speed_ms = clamp_roll_speed(guard.roll_speed_ms);
        self.persist(&guard)?;
        Ok(guard.clone())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

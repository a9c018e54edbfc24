//! Process configuration
//!
//! Resolved from the environment (a `.env` file is honoured) with defaults
//! under the platform data directory:
//! - `PROMPTVAULT_DATA_DIR`: base directory (default `<data_dir>/promptvault`)
//! - `PROMPTVAULT_DB_PATH`: SQLite file (default `<base>/promptvault.db`)
//! - `PROMPTVAULT_SETTINGS_PATH`: persisted sync settings (default `<base>/sync.json`)
//! - `PROMPTVAULT_DEBOUNCE_MS`: watcher debounce delay (default 300)
//! - `PROMPTVAULT_POLL_INTERVAL_MS`: polling fallback interval (default 2000)
//! - `PROMPTVAULT_WATCH_MODE`: `auto` or `poll` (default `auto`)

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::{
    errors::{Result, VaultError},
    watcher::WatchOptions,
};

/// Default debounce delay applied to native watch events
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Default polling interval when native watching is unavailable
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// How the directory watcher observes changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchMode {
    /// Native notifications, polling only when registration fails
    #[default]
    Auto,
    /// Always poll
    Poll,
}

impl FromStr for WatchMode {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "native" => Ok(WatchMode::Auto),
            "poll" | "polling" => Ok(WatchMode::Poll),
            other => Err(VaultError::Config(format!("Unknown watch mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub data_dir:      PathBuf,
    pub database_path: PathBuf,
    pub settings_path: PathBuf,
    pub debounce:      Duration,
    pub poll_interval: Duration,
    pub watch_mode:    WatchMode,
}

impl VaultConfig {
    /// Defaults rooted at `data_dir`
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            database_path: data_dir.join("promptvault.db"),
            settings_path: data_dir.join("sync.json"),
            data_dir,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            watch_mode: WatchMode::Auto,
        }
    }

    /// Load configuration from the environment
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();

        let data_dir = match env::var_os("PROMPTVAULT_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };

        let mut config = Self::for_data_dir(data_dir);

        if let Some(path) = env::var_os("PROMPTVAULT_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(path) = env::var_os("PROMPTVAULT_SETTINGS_PATH") {
            config.settings_path = PathBuf::from(path);
        }
        if let Ok(raw) = env::var("PROMPTVAULT_DEBOUNCE_MS") {
            config.debounce = parse_millis("PROMPTVAULT_DEBOUNCE_MS", &raw)?;
        }
        if let Ok(raw) = env::var("PROMPTVAULT_POLL_INTERVAL_MS") {
            config.poll_interval = parse_millis("PROMPTVAULT_POLL_INTERVAL_MS", &raw)?;
        }
        if let Ok(raw) = env::var("PROMPTVAULT_WATCH_MODE") {
            config.watch_mode = raw.parse()?;
        }

        Ok(config)
    }

    /// Watcher tuning derived from this configuration
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            debounce:      self.debounce,
            poll_interval: self.poll_interval,
            force_polling: self.watch_mode == WatchMode::Poll,
        }
    }
}

/// `<platform data dir>/promptvault`
pub fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| VaultError::Config("Could not determine data directory".into()))?;
    Ok(base.join("promptvault"))
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| VaultError::Config(format!("{} must be milliseconds: {}", key, e)))
}

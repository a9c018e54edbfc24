//! Durable storage for [`SyncSettings`]
//!
//! The record lives in a small JSON file next to the database. Writes go to
//! a sibling temp file that is renamed over the old one.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use super::mode::SyncSettings;
use crate::errors::{Result, VaultError};

#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record, creating a default one on first run
    pub fn load(&self) -> Result<SyncSettings> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let settings = SyncSettings::default();
                self.save(&settings)?;
                tracing::info!(path = %self.path.display(), "created sync settings");
                return Ok(settings);
            },
            Err(e) => return Err(e.into()),
        };

        let mut settings: SyncSettings = serde_json::from_str(&text).map_err(|e| {
            VaultError::Config(format!("invalid sync settings in {}: {}", self.path.display(), e))
        })?;

        if settings.normalize() {
            tracing::warn!(
                path = %self.path.display(),
                mode = %settings.mode,
                "repaired inconsistent sync settings"
            );
            self.save(&settings)?;
        }

        Ok(settings)
    }

    pub fn save(&self, settings: &SyncSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(settings)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

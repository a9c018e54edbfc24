//! Sync modes and the persisted settings record

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{Result, VaultError};

/// Which backend is authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Database only
    #[default]
    AppOnly,
    /// The attached folder is the source of truth, the database mirrors it
    AttachedDirectory,
    /// Reserved. Never selectable.
    CloudSync,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::AppOnly => "app-only",
            SyncMode::AttachedDirectory => "attached-directory",
            SyncMode::CloudSync => "cloud-sync",
        }
    }

    pub fn is_selectable(&self) -> bool {
        !matches!(self, SyncMode::CloudSync)
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "app-only" | "app_only" => Ok(SyncMode::AppOnly),
            "attached-directory" | "attached_directory" | "directory" => Ok(SyncMode::AttachedDirectory),
            "cloud-sync" | "cloud_sync" | "cloud" => Ok(SyncMode::CloudSync),
            other => Err(VaultError::Validation(format!("unknown sync mode '{other}'"))),
        }
    }
}

/// Persisted sync settings
///
/// `attached_directory_path` is set exactly when `mode` is
/// [`SyncMode::AttachedDirectory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    #[serde(default)]
    pub mode:                    SyncMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_directory_path: Option<PathBuf>,
    #[serde(default = "new_device_id")]
    pub device_id:               String,
}

fn new_device_id() -> String {
    Uuid::new_v4().to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mode:                    SyncMode::AppOnly,
            attached_directory_path: None,
            device_id:               new_device_id(),
        }
    }
}

impl SyncSettings {
    pub fn app_only(device_id: impl Into<String>) -> Self {
        Self {
            mode:                    SyncMode::AppOnly,
            attached_directory_path: None,
            device_id:               device_id.into(),
        }
    }

    pub fn attached(device_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            mode:                    SyncMode::AttachedDirectory,
            attached_directory_path: Some(path.into()),
            device_id:               device_id.into(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        match self.mode {
            SyncMode::AttachedDirectory => self.attached_directory_path.is_some(),
            SyncMode::AppOnly => self.attached_directory_path.is_none(),
            SyncMode::CloudSync => false,
        }
    }

    /// Repair a record read from disk. Returns whether anything changed.
    pub fn normalize(&mut self) -> bool {
        if self.is_consistent() {
            return false;
        }
        if self.mode == SyncMode::AppOnly {
            self.attached_directory_path = None;
        } else {
            self.mode = SyncMode::AppOnly;
            self.attached_directory_path = None;
        }
        true
    }
}

/// What a mode switch has to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Attach (or re-attach) the given folder
    Attach(PathBuf),
    /// Return to the database, dropping any attached folder
    Detach,
}

/// Check a requested switch against the current settings.
///
/// An attached-directory switch without `path` reuses the stored one.
pub fn plan_transition(current: &SyncSettings, target: SyncMode, path: Option<PathBuf>) -> Result<Transition> {
    match target {
        SyncMode::CloudSync => Err(VaultError::Validation("cloud sync is not available yet".into())),
        SyncMode::AppOnly => Ok(Transition::Detach),
        SyncMode::AttachedDirectory => path
            .or_else(|| current.attached_directory_path.clone())
            .map(Transition::Attach)
            .ok_or_else(|| VaultError::Validation("attached-directory mode requires a directory path".into())),
    }
}

//! Sync engine
//!
//! - [`mode`]: modes and the persisted settings record
//! - [`settings`]: settings file storage
//! - [`controller`]: mode switching and backend routing
//! - [`reconcile`]: applying directory snapshots
//! - [`coordinator`]: the entry point for reads and mutations

pub mod controller;
pub mod coordinator;
pub mod mode;
pub mod reconcile;
pub mod replication;
pub mod settings;

pub use controller::{FixedFolder, FolderPicker, ModeCheck, Route, SyncController};
pub use coordinator::{Coordinator, SyncStatus};
pub use mode::{SyncMode, SyncSettings};
pub use reconcile::{snapshots_equal, Reconciler};
pub use settings::SettingsStore;

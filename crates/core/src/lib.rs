//! promptvault-core: local-first prompt storage with optional folder sync
//!
//! Prompts live in a SQLite database. A user may attach a folder of
//! Markdown files instead; the folder then becomes the source of truth and
//! the database is kept as a mirror.
//!
//! ## Architecture
//!
//! - **backend**: the `Backend` trait with database and directory implementations
//! - **watcher**: debounced folder watching with a polling fallback
//! - **sync**: mode switching, snapshot reconciliation and dual writes
//! - **commands**: JSON command registry used by the UI surface and the CLI

pub mod app;
pub mod backend;
pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod model;
pub mod runtime;
pub mod search;
pub mod state;
pub mod sync;
pub mod watcher;

pub use errors::{Result, VaultError};
pub use model::{NewPrompt, Prompt, PromptPatch, PromptVersion, Snapshot};
pub use sync::{Coordinator, SyncMode};

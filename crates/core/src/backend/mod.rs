//! Storage backends
//!
//! Both stores satisfy [`Backend`], so the sync engine resolves one per
//! operation and never branches on the concrete type:
//! - [`DatabaseBackend`]: SQLite rows keyed by prompt id. `delete` archives.
//! - [`DirectoryBackend`]: one Markdown file with YAML frontmatter per prompt
//!   in a user-selected folder. `delete` removes the file.
//!
//! Mutations targeting an unknown id return `Ok(None)` / `Ok(false)` rather
//! than an error.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    errors::Result,
    model::{NewPrompt, Prompt, PromptPatch},
};

mod database;
mod directory;
pub mod markdown;

pub use database::DatabaseBackend;
pub use directory::DirectoryBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Database,
    Directory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Database => write!(f, "database"),
            BackendKind::Directory => write!(f, "directory"),
        }
    }
}

/// Common prompt CRUD contract
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Full read of the collection, newest first
    async fn load_all(&self) -> Result<Vec<Prompt>>;

    /// Create a prompt. When `data.id` names an existing prompt the stored
    /// copy is overwritten instead.
    async fn create(&self, data: &NewPrompt) -> Result<Prompt>;

    async fn update(
        &self,
        id: &str,
        patch: &PromptPatch,
        change_note: Option<&str>,
    ) -> Result<Option<Prompt>>;

    async fn archive(&self, id: &str) -> Result<Option<Prompt>>;

    async fn restore(&self, id: &str) -> Result<Option<Prompt>>;

    /// Returns whether the prompt existed
    async fn delete(&self, id: &str) -> Result<bool>;
}

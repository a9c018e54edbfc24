//! Dual-write coordinator
//!
//! Every user mutation goes to the primary backend of the current mode and
//! is awaited. Its result updates the collection and the search index.
//! When a folder is attached the same mutation is replayed on the database
//! in the background; a failure there is logged and otherwise ignored.

use std::{path::PathBuf, sync::Arc};

use serde::Serialize;

use super::{
    controller::{FolderPicker, ModeCheck, Route, SyncController},
    mode::{SyncMode, SyncSettings},
    reconcile::Reconciler,
    replication::{mirror_one, Replicator},
    settings::SettingsStore,
};
use crate::{
    backend::{Backend, BackendKind, DatabaseBackend},
    config::VaultConfig,
    db::Db,
    errors::{Result, VaultError},
    model::{NewPrompt, Prompt, PromptPatch, PromptVersion, Snapshot},
    search::SearchIndex,
    state::CollectionState,
    watcher::{WatchOptions, WatchStrategy},
};

/// Point-in-time view of the engine for status displays
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub mode:                    SyncMode,
    pub attached_directory_path: Option<PathBuf>,
    pub watching:                bool,
    pub strategy:                Option<WatchStrategy>,
    pub error:                   Option<String>,
    pub prompt_count:            usize,
    pub pending_replications:    usize,
}

pub struct Coordinator {
    controller: SyncController,
    database:   Arc<DatabaseBackend>,
    state:      Arc<CollectionState>,
    index:      Arc<dyn SearchIndex>,
    reconciler: Arc<Reconciler>,
    replicator: Replicator,
}

impl Coordinator {
    /// Open the database and settings described by `config`
    pub async fn open(config: &VaultConfig, index: Arc<dyn SearchIndex>) -> Result<Self> {
        let db = Db::open(&config.database_path).await?;
        let store = SettingsStore::new(&config.settings_path);
        let settings = store.load()?;
        let database = DatabaseBackend::connect(db, &settings.device_id).await?;

        tracing::info!(
            database = %config.database_path.display(),
            mode = %settings.mode,
            "opened prompt vault"
        );

        Ok(Self::new(database, store, settings, config.watch_options(), index))
    }

    pub fn new(
        database: DatabaseBackend,
        store: SettingsStore,
        settings: SyncSettings,
        options: WatchOptions,
        index: Arc<dyn SearchIndex>,
    ) -> Self {
        let database = Arc::new(database);
        let state = Arc::new(CollectionState::new());
        let replicator = Replicator::new();
        let reconciler = Arc::new(Reconciler::new(
            state.clone(),
            index.clone(),
            database.clone(),
            replicator.clone(),
        ));
        let controller = SyncController::new(store, settings, options, reconciler.clone());

        Self {
            controller,
            database,
            state,
            index,
            reconciler,
            replicator,
        }
    }

    pub fn controller(&self) -> &SyncController {
        &self.controller
    }

    pub fn state(&self) -> &CollectionState {
        &self.state
    }

    pub fn database(&self) -> &DatabaseBackend {
        &self.database
    }

    fn route(&self) -> Route {
        self.controller.route(self.database.clone())
    }

    /// Startup: validate the persisted mode and load the collection.
    /// Returns `false` when the attached folder could not be read.
    pub async fn start(&self) -> Result<bool> {
        let valid = self.validate_current_mode().await;
        if self.controller.mode() == SyncMode::AppOnly {
            self.load_database().await?;
        }
        Ok(valid)
    }

    /// Re-read the attached folder. On failure the collection is emptied
    /// and the error is kept on the state; the mode does not change.
    pub async fn validate_current_mode(&self) -> bool {
        match self.controller.validate_current_mode().await {
            ModeCheck::AppOnly => true,
            ModeCheck::Directory(snapshot) => {
                self.reconciler.apply(snapshot);
                true
            },
            ModeCheck::Unreachable(e) => {
                self.state.replace(&Snapshot::empty());
                self.index.index_all(&[]);
                self.state.set_error(e.user_message());
                false
            },
        }
    }

    async fn load_database(&self) -> Result<()> {
        let snapshot = Snapshot::new(self.database.load_all().await?);
        self.state.replace(&snapshot);
        self.state.clear_error();
        self.index.index_all(snapshot.prompts());
        Ok(())
    }

    pub async fn switch_mode(&self, mode: SyncMode, path: Option<PathBuf>) -> Result<()> {
        match self.controller.switch_mode(mode, path).await? {
            Some(snapshot) => self.reconciler.apply(snapshot),
            None => self.load_database().await?,
        }
        Ok(())
    }

    /// Returns the attached folder, or `None` when the picker was cancelled
    pub async fn attach_directory(&self, picker: &dyn FolderPicker) -> Result<Option<PathBuf>> {
        match self.controller.attach_directory(picker).await? {
            Some(snapshot) => {
                self.reconciler.apply(snapshot);
                Ok(self.controller.attached_directory())
            },
            None => Ok(None),
        }
    }

    pub async fn detach_directory(&self) -> Result<()> {
        self.controller.detach_directory().await;
        self.load_database().await
    }

    // Reads

    pub fn list(&self, include_archived: bool) -> Vec<Prompt> {
        self.state
            .prompts()
            .into_iter()
            .filter(|p| include_archived || !p.is_archived)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Prompt> {
        self.state.get(id)
    }

    /// Version history as recorded by the database
    pub async fn versions(&self, id: &str) -> Result<Vec<PromptVersion>> {
        self.database.db().get_versions(id).await
    }

    pub fn search(&self, query: &str, include_archived: bool) -> Vec<Prompt> {
        let hits: Vec<Prompt> = match self.index.search(query) {
            Some(ids) => ids.iter().filter_map(|id| self.state.get(id)).collect(),
            None => {
                let needle = query.to_lowercase();
                self.state
                    .prompts()
                    .into_iter()
                    .filter(|p| {
                        p.title.to_lowercase().contains(&needle)
                            || p.content.to_lowercase().contains(&needle)
                            || p.has_tag(query)
                    })
                    .collect()
            },
        };
        hits.into_iter()
            .filter(|p| include_archived || !p.is_archived)
            .collect()
    }

    pub async fn resolve_file_path(&self, id: &str) -> Result<Option<PathBuf>> {
        match self.controller.directory_backend() {
            Some(directory) => directory.resolve_file_path(id).await,
            None => Ok(None),
        }
    }

    pub fn status(&self) -> SyncStatus {
        let settings = self.controller.settings();
        SyncStatus {
            mode:                    settings.mode,
            attached_directory_path: settings.attached_directory_path,
            watching:                self.controller.is_watching(),
            strategy:                self.controller.watch_strategy(),
            error:                   self.state.error(),
            prompt_count:            self.state.len(),
            pending_replications:    self.replicator.pending(),
        }
    }

    // Mutations

    pub async fn create(&self, data: NewPrompt) -> Result<Prompt> {
        require_title(Some(data.title.as_str()))?;
        let Route { primary, replica } = self.route();
        let prompt = primary.create(&data).await?;
        self.accept(&prompt);

        if let Some(replica) = replica {
            let mirrored = prompt.clone();
            self.replicator.spawn("create", &prompt.id, async move {
                mirror_one(replica.as_ref(), &mirrored).await
            });
        }

        tracing::debug!(id = %prompt.id, backend = %primary.kind(), "created prompt");
        Ok(prompt)
    }

    /// `Ok(None)` when the id is unknown to the primary
    pub async fn update(&self, id: &str, patch: PromptPatch, change_note: Option<String>) -> Result<Option<Prompt>> {
        require_title(patch.title.as_deref())?;
        let Route { primary, replica } = self.route();
        let Some(prompt) = primary.update(id, &patch, change_note.as_deref()).await? else {
            return Ok(None);
        };
        self.accept(&prompt);

        if let Some(replica) = replica {
            // Replay with the primary's timestamp so both sides agree
            let patch = PromptPatch {
                updated_at: Some(prompt.updated_at),
                ..patch
            };
            let fallback = prompt.clone();
            self.replicator.spawn("update", id, async move {
                let replayed = replica
                    .update(&fallback.id, &patch, change_note.as_deref())
                    .await?;
                match replayed {
                    Some(_) => Ok(()),
                    None => mirror_one(replica.as_ref(), &fallback).await,
                }
            });
        }

        Ok(Some(prompt))
    }

    pub async fn archive(&self, id: &str) -> Result<Option<Prompt>> {
        self.set_archived(id, true).await
    }

    pub async fn restore(&self, id: &str) -> Result<Option<Prompt>> {
        self.set_archived(id, false).await
    }

    /// The flag flips in the collection before the primary write and flips
    /// back if that write fails.
    async fn set_archived(&self, id: &str, archived: bool) -> Result<Option<Prompt>> {
        let Route { primary, replica } = self.route();
        let previous = self.state.set_archived(id, archived);

        let result = if archived {
            primary.archive(id).await
        } else {
            primary.restore(id).await
        };

        let prompt = match result {
            Ok(Some(prompt)) => prompt,
            Ok(None) => {
                self.revert_archived(id, previous);
                return Ok(None);
            },
            Err(e) => {
                self.revert_archived(id, previous);
                return Err(e);
            },
        };
        self.accept(&prompt);

        if let Some(replica) = replica {
            let fallback = prompt.clone();
            let operation = if archived { "archive" } else { "restore" };
            self.replicator.spawn(operation, id, async move {
                let replayed = if archived {
                    replica.archive(&fallback.id).await?
                } else {
                    replica.restore(&fallback.id).await?
                };
                match replayed {
                    Some(_) => Ok(()),
                    None => mirror_one(replica.as_ref(), &fallback).await,
                }
            });
        }

        Ok(Some(prompt))
    }

    fn revert_archived(&self, id: &str, previous: Option<bool>) {
        if let Some(previous) = previous {
            self.state.set_archived(id, previous);
        }
    }

    /// Deletes through the primary. A folder deletes the file; the database
    /// only archives. Returns whether the prompt existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let Route { primary, replica } = self.route();
        if !primary.delete(id).await? {
            return Ok(false);
        }

        match primary.kind() {
            BackendKind::Directory => {
                self.state.remove(id);
                self.index.remove_one(id);
            },
            BackendKind::Database => {
                if let Some(prompt) = self.database.db().get_prompt(id).await? {
                    self.accept(&prompt);
                }
            },
        }

        if let Some(replica) = replica {
            let id = id.to_string();
            self.replicator.spawn("delete", id.clone(), async move {
                replica.delete(&id).await.map(|_| ())
            });
        }

        Ok(true)
    }

    /// Remove a prompt from every backend for good, history included
    pub async fn purge(&self, id: &str) -> Result<bool> {
        let mut existed = false;
        if let Some(directory) = self.controller.directory_backend() {
            existed |= directory.delete(id).await?;
        }
        existed |= self.database.hard_delete(id).await?;

        self.state.remove(id);
        self.index.remove_one(id);
        Ok(existed)
    }

    fn accept(&self, prompt: &Prompt) {
        self.state.upsert(prompt.clone());
        self.index.add_one(prompt);
    }

    /// Wait for background database writes
    pub async fn settle(&self) {
        self.replicator.settle().await;
    }

    pub async fn shutdown(&self) {
        self.controller.stop_watching();
        self.settle().await;
        self.database.db().close().await;
    }
}

/// A prompt file without a title is skipped on load, so none is ever written
fn require_title(title: Option<&str>) -> Result<()> {
    match title {
        Some(title) if title.trim().is_empty() => {
            Err(VaultError::Validation("title must not be empty".into()))
        },
        _ => Ok(()),
    }
}

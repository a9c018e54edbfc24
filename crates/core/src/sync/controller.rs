//! Sync-mode controller
//!
//! Owns the persisted [`SyncSettings`], the attached [`DirectoryBackend`]
//! and the watcher bound to it. Switching into directory mode reads the
//! whole folder first; nothing is committed when that read fails.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use super::{
    mode::{plan_transition, SyncMode, SyncSettings, Transition},
    settings::SettingsStore,
};
use crate::{
    backend::{Backend, DirectoryBackend},
    errors::{Result, VaultError},
    model::Snapshot,
    watcher::{DirectoryWatcher, SnapshotSink, WatchOptions, WatchStrategy},
};

/// Source of a folder chosen by the user
#[async_trait]
pub trait FolderPicker: Send + Sync {
    /// `None` when the user cancelled
    async fn pick_folder(&self) -> Option<PathBuf>;
}

/// Picker that answers with a folder chosen up front
#[derive(Debug, Clone, Default)]
pub struct FixedFolder(pub Option<PathBuf>);

#[async_trait]
impl FolderPicker for FixedFolder {
    async fn pick_folder(&self) -> Option<PathBuf> {
        self.0.clone()
    }
}

/// Outcome of re-checking the persisted mode
#[derive(Debug)]
pub enum ModeCheck {
    AppOnly,
    /// Folder readable; carries its full contents
    Directory(Snapshot),
    /// Folder missing or unreadable. The mode is kept.
    Unreachable(VaultError),
}

/// Where mutations go: the primary is awaited, the replica is mirrored in
/// the background
#[derive(Clone)]
pub struct Route {
    pub primary: Arc<dyn Backend>,
    pub replica: Option<Arc<dyn Backend>>,
}

pub struct SyncController {
    store:     SettingsStore,
    settings:  Mutex<SyncSettings>,
    directory: Mutex<Option<Arc<DirectoryBackend>>>,
    watcher:   DirectoryWatcher,
    sink:      Arc<dyn SnapshotSink>,
    switching: tokio::sync::Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncController {
    pub fn new(
        store: SettingsStore,
        settings: SyncSettings,
        options: WatchOptions,
        sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        let directory = match (settings.mode, &settings.attached_directory_path) {
            (SyncMode::AttachedDirectory, Some(path)) => Some(Arc::new(DirectoryBackend::new(path))),
            _ => None,
        };

        Self {
            store,
            settings: Mutex::new(settings),
            directory: Mutex::new(directory),
            watcher: DirectoryWatcher::new(options),
            sink,
            switching: tokio::sync::Mutex::new(()),
        }
    }

    pub fn settings(&self) -> SyncSettings {
        lock(&self.settings).clone()
    }

    pub fn mode(&self) -> SyncMode {
        lock(&self.settings).mode
    }

    pub fn device_id(&self) -> String {
        lock(&self.settings).device_id.clone()
    }

    pub fn attached_directory(&self) -> Option<PathBuf> {
        lock(&self.settings).attached_directory_path.clone()
    }

    pub fn directory_backend(&self) -> Option<Arc<DirectoryBackend>> {
        lock(&self.directory).clone()
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_watching()
    }

    pub fn watch_strategy(&self) -> Option<WatchStrategy> {
        self.watcher.strategy()
    }

    /// Ask the watcher for an immediate (debounced) re-read
    pub fn schedule_reload(&self) {
        self.watcher.schedule_reload();
    }

    pub fn stop_watching(&self) {
        self.watcher.stop();
    }

    /// Backends for the current mode. `database` is primary unless a folder is attached.
    pub fn route(&self, database: Arc<dyn Backend>) -> Route {
        match self.directory_backend() {
            Some(directory) => Route {
                primary: directory,
                replica: Some(database),
            },
            None => Route {
                primary: database,
                replica: None,
            },
        }
    }

    /// Re-read the attached folder after a restart. Starts watching on success.
    pub async fn validate_current_mode(&self) -> ModeCheck {
        let Some(backend) = self.directory_backend() else {
            return ModeCheck::AppOnly;
        };

        match backend.load_all().await {
            Ok(prompts) => {
                self.watcher.start((*backend).clone(), self.sink.clone());
                tracing::info!(
                    directory = %backend.root().display(),
                    count = prompts.len(),
                    "attached directory validated"
                );
                ModeCheck::Directory(Snapshot::new(prompts))
            },
            Err(e) => {
                tracing::warn!(directory = %backend.root().display(), error = %e, "attached directory unreachable");
                ModeCheck::Unreachable(e)
            },
        }
    }

    /// Move to `target`. Returns the folder contents when a folder was attached.
    pub async fn switch_mode(&self, target: SyncMode, path: Option<PathBuf>) -> Result<Option<Snapshot>> {
        let _switching = self.switching.lock().await;
        let current = self.settings();

        match plan_transition(&current, target, path)? {
            Transition::Attach(path) => {
                let backend = DirectoryBackend::new(&path);
                let prompts = backend.load_all().await?;

                let next = SyncSettings::attached(current.device_id.clone(), &path);
                self.store.save(&next)?;

                let backend = Arc::new(backend);
                *lock(&self.directory) = Some(backend.clone());
                *lock(&self.settings) = next;
                self.watcher.start((*backend).clone(), self.sink.clone());

                tracing::info!(directory = %path.display(), count = prompts.len(), "attached directory");
                Ok(Some(Snapshot::new(prompts)))
            },
            Transition::Detach => {
                let next = SyncSettings::app_only(current.device_id.clone());
                self.store.save(&next)?;
                self.leave_directory(next);
                Ok(None)
            },
        }
    }

    /// Let the user pick a folder and attach it. `Ok(None)` when cancelled.
    pub async fn attach_directory(&self, picker: &dyn FolderPicker) -> Result<Option<Snapshot>> {
        match picker.pick_folder().await {
            Some(path) => self.switch_mode(SyncMode::AttachedDirectory, Some(path)).await,
            None => Ok(None),
        }
    }

    /// Return to app-only. The in-memory switch happens even when the
    /// settings file cannot be written.
    pub async fn detach_directory(&self) {
        let _switching = self.switching.lock().await;
        let next = SyncSettings::app_only(self.device_id());
        if let Err(e) = self.store.save(&next) {
            tracing::warn!(error = %e, "failed to persist detach");
        }
        self.leave_directory(next);
    }

    fn leave_directory(&self, next: SyncSettings) {
        self.watcher.stop();
        let previous = lock(&self.directory).take();
        *lock(&self.settings) = next;
        if let Some(previous) = previous {
            tracing::info!(directory = %previous.root().display(), "detached directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::backend::BackendKind;

    struct NullSink;

    impl SnapshotSink for NullSink {
        fn accept(&self, _snapshot: Snapshot) {}
    }

    struct NullBackend;

    #[async_trait]
    impl Backend for NullBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Database
        }

        async fn load_all(&self) -> Result<Vec<crate::model::Prompt>> {
            Ok(vec![])
        }

        async fn create(&self, _data: &crate::model::NewPrompt) -> Result<crate::model::Prompt> {
            Err(VaultError::Other("unused".into()))
        }

        async fn update(
            &self,
            _id: &str,
            _patch: &crate::model::PromptPatch,
            _change_note: Option<&str>,
        ) -> Result<Option<crate::model::Prompt>> {
            Ok(None)
        }

        async fn archive(&self, _id: &str) -> Result<Option<crate::model::Prompt>> {
            Ok(None)
        }

        async fn restore(&self, _id: &str) -> Result<Option<crate::model::Prompt>> {
            Ok(None)
        }

        async fn delete(&self, _id: &str) -> Result<bool> {
            Ok(false)
        }
    }

    fn controller(dir: &TempDir) -> SyncController {
        let store = SettingsStore::new(dir.path().join("sync.json"));
        let settings = store.load().unwrap();
        SyncController::new(store, settings, WatchOptions::default(), Arc::new(NullSink))
    }

    #[tokio::test]
    async fn test_switch_into_directory_persists_and_watches() {
        let data = TempDir::new().unwrap();
        let folder = TempDir::new().unwrap();
        let controller = controller(&data);

        let snapshot = controller
            .switch_mode(SyncMode::AttachedDirectory, Some(folder.path().to_path_buf()))
            .await
            .unwrap();
        assert!(snapshot.unwrap().is_empty());
        assert_eq!(controller.mode(), SyncMode::AttachedDirectory);
        assert!(controller.is_watching());

        let on_disk = SettingsStore::new(data.path().join("sync.json")).load().unwrap();
        assert_eq!(on_disk.attached_directory_path.as_deref(), Some(folder.path()));

        let route = controller.route(Arc::new(NullBackend));
        assert_eq!(route.primary.kind(), BackendKind::Directory);
        assert_eq!(route.replica.map(|r| r.kind()), Some(BackendKind::Database));
    }

    #[tokio::test]
    async fn test_unreadable_directory_commits_nothing() {
        let data = TempDir::new().unwrap();
        let controller = controller(&data);
        let missing = data.path().join("does-not-exist");

        let err = controller
            .switch_mode(SyncMode::AttachedDirectory, Some(missing))
            .await
            .unwrap_err();
        assert_eq!(err.category(), "access");
        assert_eq!(controller.mode(), SyncMode::AppOnly);
        assert!(controller.attached_directory().is_none());
        assert!(!controller.is_watching());
    }

    #[tokio::test]
    async fn test_mode_guards() {
        let data = TempDir::new().unwrap();
        let controller = controller(&data);

        let no_path = controller.switch_mode(SyncMode::AttachedDirectory, None).await.unwrap_err();
        assert_eq!(no_path.category(), "validation");

        let cloud = controller.switch_mode(SyncMode::CloudSync, None).await.unwrap_err();
        assert_eq!(cloud.category(), "validation");
        assert_eq!(controller.mode(), SyncMode::AppOnly);
    }

    #[tokio::test]
    async fn test_detach_clears_path_and_stops_watching() {
        let data = TempDir::new().unwrap();
        let folder = TempDir::new().unwrap();
        let controller = controller(&data);
        controller
            .attach_directory(&FixedFolder(Some(folder.path().to_path_buf())))
            .await
            .unwrap();

        controller.detach_directory().await;
        assert_eq!(controller.mode(), SyncMode::AppOnly);
        assert!(controller.attached_directory().is_none());
        assert!(controller.directory_backend().is_none());
        assert!(!controller.is_watching());

        let route = controller.route(Arc::new(NullBackend));
        assert_eq!(route.primary.kind(), BackendKind::Database);
        assert!(route.replica.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_picker_changes_nothing() {
        let data = TempDir::new().unwrap();
        let controller = controller(&data);

        let result = controller.attach_directory(&FixedFolder(None)).await.unwrap();
        assert!(result.is_none());
        assert_eq!(controller.mode(), SyncMode::AppOnly);
    }

    #[tokio::test]
    async fn test_validate_reports_unreachable_but_keeps_mode() {
        let data = TempDir::new().unwrap();
        let gone = data.path().join("gone");
        let store = SettingsStore::new(data.path().join("sync.json"));
        store.save(&SyncSettings::attached("device", &gone)).unwrap();

        let settings = store.load().unwrap();
        let controller = SyncController::new(store, settings, WatchOptions::default(), Arc::new(NullSink));

        match controller.validate_current_mode().await {
            ModeCheck::Unreachable(e) => assert_eq!(e.category(), "access"),
            other => panic!("expected unreachable, got {other:?}"),
        }
        assert_eq!(controller.mode(), SyncMode::AttachedDirectory);
        assert!(!controller.is_watching());
    }
}

//! Shared fixtures for the sync scenario tests

#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use promptvault_core::{
    backend::DatabaseBackend,
    db::Db,
    model::Prompt,
    search::{MemoryIndex, SearchIndex},
    sync::{Coordinator, SettingsStore},
    watcher::WatchOptions,
};
use tempfile::TempDir;

/// Index that counts full rebuilds
#[derive(Default)]
pub struct RecordingIndex {
    pub rebuilds: AtomicUsize,
    inner:        MemoryIndex,
}

impl RecordingIndex {
    pub fn rebuilds(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }
}

impl SearchIndex for RecordingIndex {
    fn index_all(&self, prompts: &[Prompt]) {
        self.rebuilds.fetch_add(1, Ordering::SeqCst);
        self.inner.index_all(prompts);
    }

    fn add_one(&self, prompt: &Prompt) {
        self.inner.add_one(prompt);
    }

    fn remove_one(&self, id: &str) {
        self.inner.remove_one(id);
    }

    fn search(&self, query: &str) -> Option<Vec<String>> {
        self.inner.search(query)
    }
}

/// Short timings so tests observe reloads quickly. Polling keeps them
/// independent of the platform's native notifications.
pub fn fast_watch() -> WatchOptions {
    WatchOptions {
        debounce:      Duration::from_millis(50),
        poll_interval: Duration::from_millis(100),
        force_polling: true,
    }
}

/// Wait for a few polling rounds
pub async fn let_watcher_run() {
    tokio::time::sleep(Duration::from_millis(450)).await;
}

pub async fn open_vault(data: &TempDir, index: Arc<dyn SearchIndex>) -> Coordinator {
    let db = Db::open(data.path().join("vault.db")).await.unwrap();
    let store = SettingsStore::new(data.path().join("sync.json"));
    let settings = store.load().unwrap();
    let database = DatabaseBackend::connect(db, &settings.device_id).await.unwrap();

    let vault = Coordinator::new(database, store, settings, fast_watch(), index);
    vault.start().await.unwrap();
    vault
}

pub async fn open_default(data: &TempDir) -> Coordinator {
    open_vault(data, Arc::new(MemoryIndex::new())).await
}

/// Drop a Markdown prompt file into `dir` the way an external editor would
pub fn write_prompt_file(dir: &Path, file_name: &str, id: Option<&str>, title: &str, body: &str) {
    let mut text = String::from("---\n");
    if let Some(id) = id {
        text.push_str(&format!("id: {id}\n"));
    }
    text.push_str(&format!("title: {title}\n"));
    text.push_str("updated_at: 2024-05-01T10:00:00.000Z\n");
    text.push_str(&format!("---\n\n{body}\n"));

    let tmp = dir.join(format!(".{file_name}.tmp"));
    std::fs::write(&tmp, text).unwrap();
    std::fs::rename(&tmp, dir.join(file_name)).unwrap();
}

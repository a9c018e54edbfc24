//! In-memory collection shown to the UI
//!
//! Holds the current prompt list (newest first), the persistent error
//! message surfaced after a failed startup validation, and counters the UI
//! uses to detect changes.

use std::sync::RwLock;

use crate::model::{sort_by_updated_desc, Prompt, Snapshot};

#[derive(Debug, Default)]
struct Inner {
    prompts:      Vec<Prompt>,
    error:        Option<String>,
    revision:     u64,
    replacements: u64,
}

#[derive(Debug, Default)]
pub struct CollectionState {
    inner: RwLock<Inner>,
}

impl CollectionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.read().prompts.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.prompts())
    }

    pub fn get(&self, id: &str) -> Option<Prompt> {
        self.read().prompts.iter().find(|p| p.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let mut inner = self.write();
        inner.error = Some(message.into());
        inner.revision += 1;
    }

    pub fn clear_error(&self) {
        let mut inner = self.write();
        if inner.error.take().is_some() {
            inner.revision += 1;
        }
    }

    /// Bumped on every change
    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    /// Number of whole-collection replacements so far
    pub fn replacements(&self) -> u64 {
        self.read().replacements
    }

    /// Swap in a whole snapshot
    pub fn replace(&self, snapshot: &Snapshot) {
        let mut prompts = snapshot.to_vec();
        sort_by_updated_desc(&mut prompts);

        let mut inner = self.write();
        inner.prompts = prompts;
        inner.revision += 1;
        inner.replacements += 1;
    }

    /// Insert or replace one prompt by id
    pub fn upsert(&self, prompt: Prompt) {
        let mut inner = self.write();
        match inner.prompts.iter_mut().find(|p| p.id == prompt.id) {
            Some(existing) => *existing = prompt,
            None => inner.prompts.push(prompt),
        }
        sort_by_updated_desc(&mut inner.prompts);
        inner.revision += 1;
    }

    pub fn remove(&self, id: &str) -> Option<Prompt> {
        let mut inner = self.write();
        let pos = inner.prompts.iter().position(|p| p.id == id)?;
        inner.revision += 1;
        Some(inner.prompts.remove(pos))
    }

    /// Flip the archived flag in place, returning the previous value
    pub fn set_archived(&self, id: &str, archived: bool) -> Option<bool> {
        let mut inner = self.write();
        let prompt = inner.prompts.iter_mut().find(|p| p.id == id)?;
        let previous = prompt.is_archived;
        prompt.is_archived = archived;
        inner.revision += 1;
        Some(previous)
    }
}

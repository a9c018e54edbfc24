//! Reconciliation of directory snapshots against the in-memory collection
//!
//! The directory is the source of truth. A snapshot that matches what is
//! already shown is dropped without touching state, the index or the
//! database, so our own file writes echoing back through the watcher cost
//! nothing.

use std::{collections::HashMap, sync::Arc};

use super::replication::{mirror_all, Replicator};
use crate::{
    backend::Backend,
    model::{Prompt, Snapshot},
    search::SearchIndex,
    state::CollectionState,
    watcher::SnapshotSink,
};

fn same_content(a: &Prompt, b: &Prompt) -> bool {
    a.title == b.title
        && a.description == b.description
        && a.content == b.content
        && a.updated_at == b.updated_at
        && a.is_archived == b.is_archived
        && a.sorted_tags() == b.sorted_tags()
}

/// Whether two collections hold the same prompts. Order, file paths and
/// version history are ignored.
pub fn snapshots_equal(a: &[Prompt], b: &[Prompt]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let left: HashMap<&str, &Prompt> = a.iter().map(|p| (p.id.as_str(), p)).collect();
    let right: HashMap<&str, &Prompt> = b.iter().map(|p| (p.id.as_str(), p)).collect();
    if left.len() != a.len() || right.len() != b.len() {
        return false;
    }

    right
        .iter()
        .all(|(id, p)| left.get(id).is_some_and(|other| same_content(other, p)))
}

/// Applies authoritative snapshots to state, index and the mirror database
pub struct Reconciler {
    state:      Arc<CollectionState>,
    index:      Arc<dyn SearchIndex>,
    replica:    Arc<dyn Backend>,
    replicator: Replicator,
}

impl Reconciler {
    pub fn new(
        state: Arc<CollectionState>,
        index: Arc<dyn SearchIndex>,
        replica: Arc<dyn Backend>,
        replicator: Replicator,
    ) -> Self {
        Self {
            state,
            index,
            replica,
            replicator,
        }
    }

    /// Apply `snapshot` unless it matches the current collection.
    /// Returns whether anything was applied.
    pub fn reconcile(&self, snapshot: Snapshot) -> bool {
        if snapshots_equal(self.state.snapshot().prompts(), snapshot.prompts()) {
            tracing::trace!(count = snapshot.len(), "snapshot unchanged");
            return false;
        }
        self.apply(snapshot);
        true
    }

    /// Replace state, rebuild the index and mirror into the database
    pub fn apply(&self, snapshot: Snapshot) {
        tracing::debug!(count = snapshot.len(), "applying directory snapshot");

        self.state.replace(&snapshot);
        self.state.clear_error();
        self.index.index_all(snapshot.prompts());

        let replica = self.replica.clone();
        self.replicator.spawn("mirror", "snapshot", async move {
            mirror_all(replica, snapshot).await;
            Ok(())
        });
    }
}

impl SnapshotSink for Reconciler {
    fn accept(&self, snapshot: Snapshot) {
        self.reconcile(snapshot);
    }
}

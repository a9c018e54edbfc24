//! Fire-and-forget writes to the secondary backend
//!
//! Failures are logged and never reach the caller. Writes run one at a
//! time in the order they were spawned, so a create always lands before
//! the update that follows it. Shutdown paths and tests can wait for the
//! queue to drain.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use tokio::{sync::Notify, task::JoinHandle};

use crate::{
    backend::Backend,
    errors::{Result, VaultError},
    model::{NewPrompt, Prompt, Snapshot},
};

#[derive(Debug, Clone, Default)]
pub struct Replicator {
    tail:    Arc<Mutex<Option<JoinHandle<()>>>>,
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl Replicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` behind every write spawned before it, logging a failure
    /// as a replication error
    pub fn spawn<F>(&self, operation: &'static str, id: impl Into<String>, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let id = id.into();

        let Ok(mut tail) = self.tail.lock() else {
            tracing::warn!(operation, id = %id, "replication queue poisoned, dropping write");
            return;
        };

        let previous = tail.take();
        self.pending.fetch_add(1, Ordering::SeqCst);
        let done = Done {
            pending: self.pending.clone(),
            drained: self.drained.clone(),
        };
        let handle = tokio::spawn(async move {
            let _done = done;
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            if let Err(e) = task.await {
                let err = VaultError::Replication(format!("{operation} {id}: {e}"));
                tracing::warn!(category = err.category(), "{}", err);
            }
        });
        *tail = Some(handle);
    }

    /// Writes spawned and not yet finished
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every spawned write has finished, including writes
    /// spawned while waiting
    pub async fn settle(&self) {
        loop {
            let notified = self.drained.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one queued write finished, also when the write panics
struct Done {
    pending: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl Drop for Done {
    fn drop(&mut self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// Upsert `prompt` into `replica`
pub async fn mirror_one(replica: &dyn Backend, prompt: &Prompt) -> Result<()> {
    replica.create(&NewPrompt::from_prompt(prompt)).await.map(|_| ())
}

/// Upsert every prompt of `snapshot` into `replica`. Individual failures
/// are logged and skipped. Returns how many prompts were mirrored.
pub async fn mirror_all(replica: Arc<dyn Backend>, snapshot: Snapshot) -> usize {
    let mut mirrored = 0;
    for prompt in snapshot.iter() {
        match mirror_one(replica.as_ref(), prompt).await {
            Ok(()) => mirrored += 1,
            Err(e) => {
                let err = VaultError::Replication(format!("mirror {}: {}", prompt.id, e));
                tracing::warn!(category = err.category(), "{}", err);
            },
        }
    }
    tracing::debug!(mirrored, total = snapshot.len(), backend = %replica.kind(), "mirrored snapshot");
    mirrored
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_settle_waits_for_spawned_writes() {
        let replicator = Replicator::new();
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..5 {
            let done = done.clone();
            replicator.spawn("test", format!("p{i}"), async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        replicator.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(replicator.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_writes_run_in_spawn_order() {
        let replicator = Replicator::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..20u64 {
            let order = order.clone();
            replicator.spawn("test", "p1", async move {
                // Earlier writes sleep longer, so only ordering keeps them first
                tokio::time::sleep(Duration::from_millis(20 - i)).await;
                order.lock().unwrap().push(i);
                Ok(())
            });
        }

        replicator.settle().await;
        assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failure_does_not_block_later_writes() {
        let replicator = Replicator::new();
        let done = Arc::new(AtomicUsize::new(0));

        replicator.spawn("create", "p1", async { Err(VaultError::Other("locked".into())) });
        let counter = done.clone();
        replicator.spawn("update", "p1", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        replicator.settle().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(replicator.pending(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_is_swallowed() {
        let replicator = Replicator::new();
        replicator.spawn("update", "p1", async { Err(VaultError::Other("disk full".into())) });
        replicator.settle().await;
        assert_eq!(replicator.pending(), 0);
    }
}

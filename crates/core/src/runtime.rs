//! Process-wide async runtime
//!
//! The command surface is synchronous; handlers drive the async engine on
//! this runtime. Watcher sessions and background replication spawned from
//! inside [`block_on`] keep running on it after the call returns.

use std::future::Future;

use once_cell::sync::Lazy;
use tokio::{runtime::Runtime, task::JoinHandle};

/// Shared multi-threaded runtime, built on first use
pub static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .thread_name("promptvault")
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime")
});

pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    RUNTIME.spawn(future)
}

/// Run a future to completion on the shared runtime, blocking the caller.
/// Must not be called from inside an async context.
pub fn block_on<F: Future>(future: F) -> F::Output {
    RUNTIME.block_on(future)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawned_task_outlives_block_on() {
        let (tx, rx) = std::sync::mpsc::channel();
        block_on(async move {
            spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                let _ = tx.send(42);
            });
        });

        let value = rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        assert_eq!(value, 42);
    }
}

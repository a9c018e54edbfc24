//! Directory watcher
//!
//! Observes one folder (non-recursive) and hands whole-collection snapshots
//! to a [`SnapshotSink`]:
//! - Native notifications (via `notify`) re-arm a single debounce timer, so a
//!   burst of events collapses into one full re-read.
//! - When native registration fails the session polls at a fixed interval
//!   and hands off every read directly.
//!
//! A [`WatchSession`] owns its timer, its native registration and its sink.
//! Stopping or dropping it tears all of that down; a read that completes
//! after cancellation is discarded. A handoff already under way finishes
//! before `stop` returns.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use notify::{
    event::{AccessKind, AccessMode},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep_until, Instant, Interval, MissedTickBehavior},
};

use crate::{
    backend::{markdown::is_prompt_file, Backend, DirectoryBackend},
    model::Snapshot,
};

/// Receiver of directory snapshots
pub trait SnapshotSink: Send + Sync {
    fn accept(&self, snapshot: Snapshot);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    pub debounce:      Duration,
    pub poll_interval: Duration,
    /// Skip native registration and poll from the start
    pub force_polling: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce:      Duration::from_millis(crate::config::DEFAULT_DEBOUNCE_MS),
            poll_interval: Duration::from_millis(crate::config::DEFAULT_POLL_INTERVAL_MS),
            force_polling: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchStrategy {
    Native,
    Polling,
}

/// One active watch over one directory
pub struct WatchSession {
    directory: PathBuf,
    strategy:  WatchStrategy,
    cancel:    watch::Sender<bool>,
    handoff:   Arc<Mutex<bool>>,
    trigger:   mpsc::UnboundedSender<()>,
    task:      Option<JoinHandle<()>>,
    native:    Option<RecommendedWatcher>,
}

impl WatchSession {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn strategy(&self) -> WatchStrategy {
        self.strategy
    }

    pub fn is_active(&self) -> bool {
        !*self.cancel.borrow() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Schedule a debounced reload, as a filesystem event would
    pub fn schedule_reload(&self) {
        let _ = self.trigger.send(());
    }

    /// Cancel the timer/interval, deregister the native watch and release the sink
    pub fn stop(&mut self) {
        if *self.cancel.borrow() {
            return;
        }
        // Waits out a handoff in progress; none start afterwards
        *lock_gate(&self.handoff) = false;
        let _ = self.cancel.send(true);

        // Dropping the watcher deregisters its callback
        self.native.take();

        if let Some(task) = self.task.take() {
            task.abort();
        }

        tracing::info!(directory = %self.directory.display(), "watch session stopped");
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start watching `backend`'s directory. Must be called within a tokio runtime.
pub fn start_watch(
    backend: DirectoryBackend,
    sink: Arc<dyn SnapshotSink>,
    options: WatchOptions,
) -> WatchSession {
    let directory = backend.root().to_path_buf();
    let (trigger, events) = mpsc::unbounded_channel::<()>();
    let (cancel, cancelled) = watch::channel(false);
    let handoff = Arc::new(Mutex::new(true));

    let native = if options.force_polling {
        None
    } else {
        match register_native(&directory, trigger.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(
                    directory = %directory.display(),
                    error = %e,
                    "native watch unavailable, falling back to polling"
                );
                None
            },
        }
    };

    let strategy = if native.is_some() {
        WatchStrategy::Native
    } else {
        WatchStrategy::Polling
    };

    let task = tokio::spawn(run_session(
        backend,
        sink,
        events,
        cancelled,
        handoff.clone(),
        options,
        strategy,
    ));

    tracing::info!(directory = %directory.display(), ?strategy, "watch session started");

    WatchSession {
        directory,
        strategy,
        cancel,
        handoff,
        trigger,
        task: Some(task),
        native,
    }
}

fn register_native(
    directory: &Path,
    trigger: mpsc::UnboundedSender<()>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_relevant(&event) => {
            let _ = trigger.send(());
        },
        Ok(_) => {},
        Err(e) => tracing::debug!(error = %e, "watch event error"),
    })?;
    watcher.watch(directory, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Content changes to `.md` files. Plain reads are ignored so our own
/// reloads do not feed back into the watcher.
fn is_relevant(event: &Event) -> bool {
    let kind_matters = match event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        _ => true,
    };
    kind_matters && event.paths.iter().any(|p| is_prompt_file(p))
}

async fn run_session(
    backend: DirectoryBackend,
    sink: Arc<dyn SnapshotSink>,
    mut events: mpsc::UnboundedReceiver<()>,
    mut cancelled: watch::Receiver<bool>,
    handoff: Arc<Mutex<bool>>,
    options: WatchOptions,
    strategy: WatchStrategy,
) {
    let mut ticker = match strategy {
        WatchStrategy::Polling => {
            let mut interval = tokio::time::interval_at(
                Instant::now() + options.poll_interval,
                options.poll_interval,
            );
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(interval)
        },
        WatchStrategy::Native => None,
    };
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancelled.changed() => break,
            event = events.recv() => match event {
                // Re-arm: repeated events only push the deadline out
                Some(()) => deadline = Some(Instant::now() + options.debounce),
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                reload(&backend, sink.as_ref(), &handoff).await;
            },
            _ = tick(&mut ticker) => {
                reload(&backend, sink.as_ref(), &handoff).await;
            },
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        },
        None => std::future::pending::<()>().await,
    }
}

async fn reload(backend: &DirectoryBackend, sink: &dyn SnapshotSink, handoff: &Mutex<bool>) {
    match backend.load_all().await {
        Ok(prompts) => {
            // Held across the handoff so `stop` cannot interleave with it
            let open = lock_gate(handoff);
            if !*open {
                return;
            }
            tracing::debug!(directory = %backend.root().display(), count = prompts.len(), "directory reloaded");
            sink.accept(Snapshot::new(prompts));
        },
        Err(e) => {
            tracing::warn!(directory = %backend.root().display(), error = %e, "directory reload failed");
        },
    }
}

fn lock_gate(gate: &Mutex<bool>) -> std::sync::MutexGuard<'_, bool> {
    gate.lock().unwrap_or_else(|e| e.into_inner())
}

/// Holder enforcing at most one session at a time
pub struct DirectoryWatcher {
    options: WatchOptions,
    session: Mutex<Option<WatchSession>>,
}

impl DirectoryWatcher {
    pub fn new(options: WatchOptions) -> Self {
        Self {
            options,
            session: Mutex::new(None),
        }
    }

    pub fn options(&self) -> WatchOptions {
        self.options
    }

    /// Replace any running session with a new one over `backend`'s directory
    pub fn start(&self, backend: DirectoryBackend, sink: Arc<dyn SnapshotSink>) {
        let mut slot = self.lock();
        if let Some(mut previous) = slot.take() {
            previous.stop();
        }
        *slot = Some(start_watch(backend, sink, self.options));
    }

    pub fn stop(&self) {
        if let Some(mut session) = self.lock().take() {
            session.stop();
        }
    }

    pub fn is_watching(&self) -> bool {
        self.lock().as_ref().is_some_and(WatchSession::is_active)
    }

    pub fn directory(&self) -> Option<PathBuf> {
        self.lock().as_ref().map(|s| s.directory().to_path_buf())
    }

    pub fn strategy(&self) -> Option<WatchStrategy> {
        self.lock().as_ref().map(WatchSession::strategy)
    }

    pub fn schedule_reload(&self) {
        if let Some(session) = self.lock().as_ref() {
            session.schedule_reload();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<WatchSession>> {
        // A poisoned slot still holds a valid Option
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

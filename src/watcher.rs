use std::{
    collections::HashSet,
    path::Path,
    sync::{
        Arc,
        mpsc::{Receiver, RecvTimeoutError, channel},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::{
    error::{Error, Result},
    flat_index::DenseIndex,
    indexer::Indexer,
    vault::DocumentStore,
};

/// Upper bound on how long a steady stream of events can postpone a sync.
const MAX_BATCH_WAIT: Duration = Duration::from_secs(3);

/// Above this many distinct changed paths a full rescan is cheaper than
/// per-path reconciliation.
const MAX_HINT_PATHS: usize = 512;

/// Watches the vault directory and keeps the index in sync.
///
/// Raw filesystem events are collapsed behind a quiet window: a burst of
/// saves to the same file triggers one reconciliation, not one per event.
pub struct VaultWatcher {
    // Dropping the watcher closes the event channel, which stops the
    // debounce thread.
    watcher: Option<RecommendedWatcher>,
    handle: Option<JoinHandle<()>>,
}

impl VaultWatcher {
    /// Start watching the indexer's vault root recursively.
    ///
    /// The indexer must already be initialized; the watcher only ever
    /// calls [`Indexer::sync`].
    pub fn start<V: DenseIndex + 'static>(indexer: Arc<Indexer<V>>) -> Result<Self> {
        let root = indexer.config().vault_root.clone();
        let debounce = indexer.config().debounce;

        let (tx, rx) = channel::<Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(err) => {
                    tracing::warn!("filesystem watch error: {err}");
                }
            }
        })
        .map_err(|e| Error::Config(format!("cannot create filesystem watcher: {e}")))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| Error::Config(format!("cannot watch {}: {e}", root.display())))?;

        tracing::info!("watching {} for changes", root.display());
        let handle = std::thread::Builder::new()
            .name("vault-watcher".into())
            .spawn(move || debounce_loop(rx, indexer, debounce))?;

        Ok(Self {
            watcher: Some(watcher),
            handle: Some(handle),
        })
    }
}

impl Drop for VaultWatcher {
    fn drop(&mut self) {
        // Stop event delivery first so the thread sees a disconnect.
        self.watcher.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn debounce_loop<V: DenseIndex>(
    rx: Receiver<Event>,
    indexer: Arc<Indexer<V>>,
    debounce: Duration,
) {
    let vault = DocumentStore::new(&indexer.config().vault_root);
    let mut state = DebounceState::new(debounce, MAX_BATCH_WAIT);

    loop {
        let timeout = state.poll_interval();
        match rx.recv_timeout(timeout) {
            Ok(event) => {
                for change in classify(&event, &vault) {
                    state.record(change, Instant::now());
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if state.should_flush(Instant::now()) {
            flush(&mut state, &indexer);
        }
    }

    // Drain whatever arrived before shutdown.
    if state.has_work() {
        flush(&mut state, &indexer);
    }
}

fn flush<V: DenseIndex>(state: &mut DebounceState, indexer: &Arc<Indexer<V>>) {
    let batch = state.take();
    let hints: Option<Vec<String>> = if batch.full_rescan {
        None
    } else {
        Some(batch.paths.into_iter().collect())
    };
    if let Err(err) = indexer.sync(hints.as_deref()) {
        tracing::warn!("sync after filesystem change failed: {err}");
    }
}

/// What one filesystem event means for the index.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    /// A specific document was created, modified, or removed.
    Document(String),
    /// Something structural happened (directory rename, overflow); rescan.
    Rescan,
}

/// Translate a raw notify event into index-relevant changes.
///
/// Hidden paths are dropped, which keeps the index from reacting to its
/// own commits under `.semantic-search`.
fn classify(event: &Event, vault: &DocumentStore) -> Vec<Change> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    ) {
        return Vec::new();
    }

    let mut changes = Vec::new();
    for path in &event.paths {
        let Some(relative) = vault.relativize(path) else {
            continue;
        };
        let relative_path = Path::new(&relative);
        if is_hidden(relative_path) {
            continue;
        }
        if relative_path.extension().is_none() {
            // Directory-level change: renames and moves arrive without
            // per-file events, so the whole tree gets re-examined.
            changes.push(Change::Rescan);
        } else if crate::vault::is_supported(relative_path) {
            changes.push(Change::Document(relative));
        }
    }
    changes
}

fn is_hidden(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
    })
}

/// Accumulated changes awaiting a quiet window.
#[derive(Debug)]
struct DebounceState {
    debounce: Duration,
    max_batch: Duration,
    first_event: Option<Instant>,
    last_event: Option<Instant>,
    full_rescan: bool,
    paths: HashSet<String>,
}

#[derive(Debug)]
struct Batch {
    full_rescan: bool,
    paths: HashSet<String>,
}

impl DebounceState {
    fn new(debounce: Duration, max_batch: Duration) -> Self {
        Self {
            debounce,
            max_batch,
            first_event: None,
            last_event: None,
            full_rescan: false,
            paths: HashSet::new(),
        }
    }

    fn record(&mut self, change: Change, now: Instant) {
        self.first_event.get_or_insert(now);
        self.last_event = Some(now);
        match change {
            Change::Rescan => self.full_rescan = true,
            Change::Document(path) => {
                self.paths.insert(path);
                if self.paths.len() > MAX_HINT_PATHS {
                    self.full_rescan = true;
                }
            }
        }
    }

    fn has_work(&self) -> bool {
        self.full_rescan || !self.paths.is_empty()
    }

    /// Whether the quiet window has elapsed, or events kept arriving for
    /// longer than the batch cap.
    fn should_flush(&self, now: Instant) -> bool {
        if !self.has_work() {
            return false;
        }
        let quiet = self
            .last_event
            .is_some_and(|t| now.duration_since(t) >= self.debounce);
        let overdue = self
            .first_event
            .is_some_and(|t| now.duration_since(t) >= self.max_batch);
        quiet || overdue
    }

    fn take(&mut self) -> Batch {
        self.first_event = None;
        self.last_event = None;
        Batch {
            full_rescan: std::mem::take(&mut self.full_rescan),
            paths: std::mem::take(&mut self.paths),
        }
    }

    fn poll_interval(&self) -> Duration {
        if self.has_work() {
            self.debounce
        } else {
            // Nothing pending; wake occasionally to notice disconnects.
            Duration::from_secs(1)
        }
    }
}

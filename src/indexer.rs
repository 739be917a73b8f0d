use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
    sync::{
        Arc, Mutex, MutexGuard, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    config::IndexConfig,
    embedder::Embedder,
    error::{Error, Result},
    flat_index::{DenseIndex, FlatIndex},
    meta::{IndexEntry, IndexMeta, SCHEMA_VERSION},
    query::SearchHit,
    store::IndexStore,
    vault::{Document, DocumentStore},
};

/// Lifecycle state of the index as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Uninitialized,
    Building,
    Ready,
    Syncing,
    Corrupt,
}

/// Counts from one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Documents embedded (new or changed).
    pub embedded: usize,
    /// Entries removed because their file disappeared.
    pub removed: usize,
    /// Documents whose fingerprint matched the indexed one.
    pub unchanged: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.embedded += other.embedded;
        self.removed += other.removed;
        self.unchanged += other.unchanged;
    }
}

/// One immutable, internally consistent view of the index.
///
/// Queries hold an `Arc` to a snapshot for their whole duration; sync
/// builds a successor from clones and swaps it in only after a successful
/// commit, so readers never observe partial state.
#[derive(Debug)]
pub struct Snapshot<V: DenseIndex> {
    pub meta: IndexMeta,
    pub index: V,
}

/// Changes accumulated between reconciliation runs. Triggers arriving
/// while a sync is in flight land here and are consumed by the next pass.
#[derive(Debug, Default, Clone)]
struct PendingWork {
    full: bool,
    paths: HashSet<String>,
}

impl PendingWork {
    fn add(&mut self, paths: &[String]) {
        self.paths.extend(paths.iter().cloned());
    }

    fn take(&mut self) -> PendingWork {
        std::mem::take(self)
    }

    fn restore(&mut self, work: PendingWork) {
        self.full |= work.full;
        self.paths.extend(work.paths);
    }

    fn is_empty(&self) -> bool {
        !self.full && self.paths.is_empty()
    }
}

/// Owns the persisted index and reconciles it with the vault.
///
/// Exactly one `Indexer` may own a given storage directory; all mutation
/// goes through [`Indexer::sync`] and [`Indexer::rebuild`].
pub struct Indexer<V: DenseIndex = FlatIndex> {
    config: IndexConfig,
    vault: DocumentStore,
    store: IndexStore,
    embedder: Arc<dyn Embedder>,
    snapshot: RwLock<Option<Arc<Snapshot<V>>>>,
    state: Mutex<IndexState>,
    // Serializes reconciliation; queries never take this.
    sync_gate: Mutex<()>,
    resync_queued: AtomicBool,
    pending: Mutex<PendingWork>,
}

impl<V: DenseIndex> Indexer<V> {
    pub fn new(config: IndexConfig, embedder: Arc<dyn Embedder>) -> Self {
        let vault = DocumentStore::new(&config.vault_root);
        let store = IndexStore::new(&config.vault_root);
        Self {
            config,
            vault,
            store,
            embedder,
            snapshot: RwLock::new(None),
            state: Mutex::new(IndexState::Uninitialized),
            sync_gate: Mutex::new(()),
            resync_queued: AtomicBool::new(false),
            pending: Mutex::new(PendingWork::default()),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn state(&self) -> IndexState {
        *lock(&self.state)
    }

    pub fn document_count(&self) -> usize {
        self.current()
            .map(|s| s.meta.entries.len())
            .unwrap_or_default()
    }

    /// Load the persisted index, or build it from scratch.
    ///
    /// A schema or model mismatch quietly rebuilds; corrupt files are
    /// surfaced as a warning and rebuilt. Only I/O failures propagate.
    pub fn initialize(&self) -> Result<()> {
        if self.store.exists() {
            match self.store.load::<V>() {
                Ok((meta, index))
                    if meta.schema_version == SCHEMA_VERSION
                        && meta.model_id == self.embedder.id()
                        && meta.dimension == self.embedder.dimension() =>
                {
                    tracing::info!("loaded index with {} entries", meta.entries.len());
                    self.install(Snapshot { meta, index });
                    self.set_state(IndexState::Ready);
                    return Ok(());
                }
                Ok(_) => {
                    tracing::info!("embedding model or schema changed; rebuilding index");
                }
                Err(Error::CorruptIndex(msg)) => {
                    tracing::warn!("corrupt index: {msg}; rebuilding");
                    self.set_state(IndexState::Corrupt);
                }
                Err(err) => return Err(err),
            }
        }
        self.rebuild()?;
        Ok(())
    }

    /// Discard any existing state and embed every vault document.
    ///
    /// Labels restart at zero; this begins a new index generation.
    pub fn rebuild(&self) -> Result<usize> {
        self.set_state(IndexState::Building);
        match self.build_from_vault() {
            Ok(count) => {
                self.set_state(IndexState::Ready);
                tracing::info!("built index with {count} documents");
                Ok(count)
            }
            Err(err) => {
                // The previous snapshot, if any, is still good.
                let fallback = if self.current().is_some() {
                    IndexState::Ready
                } else {
                    IndexState::Uninitialized
                };
                self.set_state(fallback);
                Err(err)
            }
        }
    }

    fn build_from_vault(&self) -> Result<usize> {
        let documents = self.vault.list()?;
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embed_all(&texts)?;

        let mut meta = IndexMeta::new(self.embedder.id(), self.embedder.dimension());
        let mut index = V::new(self.embedder.dimension());
        for (doc, vector) in documents.iter().zip(&vectors) {
            let label = meta.allocate_label();
            index.add(label, vector)?;
            meta.entries.insert(
                doc.path.clone(),
                IndexEntry {
                    fingerprint: doc.fingerprint,
                    label,
                },
            );
        }

        self.store.commit(&meta, &index.to_bytes())?;
        let count = meta.entries.len();
        self.install(Snapshot { meta, index });
        Ok(count)
    }

    /// Reconcile the index with the vault.
    ///
    /// With `hints`, only the given vault-relative paths are re-examined;
    /// without, the whole vault is rescanned. At most one sync runs at a
    /// time; a call arriving mid-run records its changes and returns, and
    /// the running call loops until no trigger is left.
    pub fn sync(&self, hints: Option<&[String]>) -> Result<SyncReport> {
        {
            let mut pending = lock(&self.pending);
            match hints {
                Some(paths) => pending.add(paths),
                None => pending.full = true,
            }
        }

        let mut total = SyncReport::default();
        loop {
            {
                let Ok(_guard) = self.sync_gate.try_lock() else {
                    self.resync_queued.store(true, Ordering::SeqCst);
                    tracing::debug!("sync in flight; coalescing trigger");
                    return Ok(total);
                };

                loop {
                    let work = lock(&self.pending).take();
                    if work.is_empty() {
                        break;
                    }
                    match self.run_sync(&work) {
                        Ok(report) => total.absorb(report),
                        Err(err) => {
                            // Keep the changes pending so the next trigger retries.
                            lock(&self.pending).restore(work);
                            return Err(err);
                        }
                    }
                    if !self.resync_queued.swap(false, Ordering::SeqCst) {
                        break;
                    }
                }
            }

            // A trigger can land between the final flag check and the gate
            // release above; whoever released the gate last must notice it,
            // or that work would sit until an unrelated future trigger.
            if lock(&self.pending).is_empty() {
                return Ok(total);
            }
        }
    }

    fn run_sync(&self, work: &PendingWork) -> Result<SyncReport> {
        let Some(current) = self.current() else {
            return Err(Error::IndexNotReady);
        };
        self.set_state(IndexState::Syncing);
        let outcome = self.reconcile(&current, work);
        self.set_state(IndexState::Ready);
        outcome
    }

    fn reconcile(&self, current: &Snapshot<V>, work: &PendingWork) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut changed: Vec<Document> = Vec::new();
        let mut removed: Vec<String> = Vec::new();

        if work.full {
            let documents = self.vault.list()?;
            let seen: HashSet<&str> = documents.iter().map(|d| d.path.as_str()).collect();
            for doc in documents.iter() {
                match current.meta.entries.get(&doc.path) {
                    Some(entry) if entry.fingerprint == doc.fingerprint => {
                        report.unchanged += 1;
                    }
                    _ => changed.push(doc.clone()),
                }
            }
            removed.extend(
                current
                    .meta
                    .entries
                    .keys()
                    .filter(|path| !seen.contains(path.as_str()))
                    .cloned(),
            );
        } else {
            for path in &work.paths {
                match self.vault.read(path) {
                    Ok(doc) => match current.meta.entries.get(path) {
                        Some(entry) if entry.fingerprint == doc.fingerprint => {
                            report.unchanged += 1;
                        }
                        _ => changed.push(doc),
                    },
                    Err(Error::NotFound { .. }) => {
                        if current.meta.entries.contains_key(path) {
                            removed.push(path.clone());
                        }
                    }
                    Err(err) => {
                        tracing::warn!("skipping {path}: {err}");
                    }
                }
            }
        }

        if changed.is_empty() && removed.is_empty() {
            return Ok(report);
        }

        let texts: Vec<String> = changed.iter().map(|d| d.content.clone()).collect();
        let vectors = self.embed_all(&texts)?;

        let mut meta = current.meta.clone();
        let mut index = current.index.clone();

        for path in &removed {
            if let Some(entry) = meta.entries.remove(path) {
                index.remove(entry.label);
                report.removed += 1;
            }
        }

        for (doc, vector) in changed.iter().zip(&vectors) {
            let label = match meta.entries.get(&doc.path) {
                // Content change: same label, fresh vector.
                Some(entry) => {
                    index.remove(entry.label);
                    entry.label
                }
                None => meta.allocate_label(),
            };
            index.add(label, vector)?;
            meta.entries.insert(
                doc.path.clone(),
                IndexEntry {
                    fingerprint: doc.fingerprint,
                    label,
                },
            );
            report.embedded += 1;
        }

        self.store.commit(&meta, &index.to_bytes())?;
        self.install(Snapshot { meta, index });
        tracing::info!(
            "sync finished: {} embedded, {} removed, {} unchanged",
            report.embedded,
            report.removed,
            report.unchanged
        );
        Ok(report)
    }

    /// Top-k similarity search over the current snapshot.
    ///
    /// Results are ordered by descending score; equal scores resolve by
    /// lexical path order. Returns fewer than `top_k` hits if the index
    /// holds fewer documents.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be at least 1".into()));
        }
        let snapshot = self.current().ok_or(Error::IndexNotReady)?;
        if snapshot.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query)?;
        let hits = snapshot.index.search(&query_vector, snapshot.index.len());
        let mut results = resolve_hits(&snapshot.meta, &hits);
        results.truncate(top_k);
        Ok(results)
    }

    /// Find indexed documents whose similarity to `path` meets `threshold`.
    ///
    /// The document itself is excluded from its own results. Unindexed
    /// files are re-embedded on the fly so unsaved or foreign notes can be
    /// checked; unmodified indexed files reuse their stored vector.
    pub fn find_duplicates(&self, path: &str, threshold: f32) -> Result<Vec<SearchHit>> {
        let snapshot = self.current().ok_or(Error::IndexNotReady)?;
        let relative =
            self.vault
                .relativize(Path::new(path))
                .ok_or_else(|| Error::NotFound {
                    kind: "document",
                    name: path.to_string(),
                })?;
        let entry = snapshot.meta.entries.get(&relative).copied();

        let vector: Vec<f32> = match self.vault.read(&relative) {
            Ok(doc) => match entry {
                Some(e) if e.fingerprint == doc.fingerprint => {
                    stored_vector(&snapshot, e.label)?
                }
                _ => self.embedder.embed(&doc.content)?,
            },
            Err(err) => match entry {
                // Unreadable on disk but still indexed: use the last
                // embedded state.
                Some(e) => stored_vector(&snapshot, e.label)?,
                None => return Err(err),
            },
        };

        let hits = snapshot.index.search(&vector, snapshot.index.len());
        let results = resolve_hits(&snapshot.meta, &hits)
            .into_iter()
            .filter(|hit| hit.score >= threshold && hit.path != relative)
            .collect();
        Ok(results)
    }

    fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.embedder.embed_batch(texts)?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "model returned {} embeddings for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    fn current(&self) -> Option<Arc<Snapshot<V>>> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn install(&self, snapshot: Snapshot<V>) {
        let mut guard = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::new(snapshot));
    }

    fn set_state(&self, state: IndexState) {
        *lock(&self.state) = state;
    }
}

impl<V: DenseIndex> std::fmt::Debug for Indexer<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("vault_root", &self.config.vault_root)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn resolve_hits(meta: &IndexMeta, hits: &[(u64, f32)]) -> Vec<SearchHit> {
    let by_label: BTreeMap<u64, &str> = meta
        .entries
        .iter()
        .map(|(path, entry)| (entry.label, path.as_str()))
        .collect();

    let mut results: Vec<SearchHit> = hits
        .iter()
        .filter_map(|(label, score)| {
            by_label.get(label).map(|path| SearchHit {
                path: (*path).to_string(),
                score: *score,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    results
}

fn stored_vector<V: DenseIndex>(snapshot: &Snapshot<V>, label: u64) -> Result<Vec<f32>> {
    snapshot
        .index
        .vector(label)
        .map(<[f32]>::to_vec)
        .ok_or_else(|| Error::CorruptIndex(format!("label {label} missing from vector index")))
}

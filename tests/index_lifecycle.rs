use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use semvault::{Embedder, IndexConfig, Indexer, QueryService, Result};

/// Character-frequency embedder: deterministic, no model download, and
/// similar texts produce similar vectors.
struct CharEmbedder {
    id: &'static str,
    calls: AtomicUsize,
}

impl CharEmbedder {
    fn new() -> Self {
        Self {
            id: "char-stub",
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for CharEmbedder {
    fn id(&self) -> &str {
        self.id
    }

    fn dimension(&self) -> usize {
        27
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0f32; self.dimension()];
        for c in text.chars() {
            let slot = match c.to_ascii_lowercase() {
                c @ 'a'..='z' => (c as usize) - ('a' as usize),
                _ => 26,
            };
            vector[slot] += 1.0;
        }
        Ok(vector)
    }
}

fn write(root: &Path, name: &str, content: &str) {
    std::fs::write(root.join(name), content).unwrap();
}

#[test]
fn full_lifecycle_survives_a_restart() {
    let vault = tempfile::tempdir().unwrap();
    write(vault.path(), "rust.md", "ownership and borrowing in rust");
    write(vault.path(), "cooking.md", "slow roasted vegetables");

    // First process: build and persist.
    {
        let indexer: Arc<Indexer> = Arc::new(Indexer::new(
            IndexConfig::new(vault.path()),
            Arc::new(CharEmbedder::new()),
        ));
        indexer.initialize().unwrap();
        assert_eq!(indexer.document_count(), 2);
    }
    assert!(vault.path().join(".semantic-search/index_meta.json").is_file());
    assert!(vault.path().join(".semantic-search/vector_index.bin").is_file());

    // Second process: load from disk, no re-embedding, then evolve.
    let embedder = Arc::new(CharEmbedder::new());
    let indexer: Arc<Indexer> = Arc::new(Indexer::new(
        IndexConfig::new(vault.path()),
        embedder.clone(),
    ));
    indexer.initialize().unwrap();
    assert_eq!(embedder.calls(), 0);

    write(vault.path(), "baking.md", "slow roasted vegetables and bread");
    std::fs::remove_file(vault.path().join("rust.md")).unwrap();
    let report = indexer.sync(None).unwrap();
    assert_eq!(report.embedded, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.unchanged, 1);

    let query = QueryService::new(indexer);
    let hits = query.search_related("roasted vegetables", Some(2)).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.path != "rust.md"));

    let dupes = query.check_duplicates("cooking.md", Some(0.8)).unwrap();
    assert_eq!(dupes.len(), 1);
    assert_eq!(dupes[0].path, "baking.md");
}

//! Shared helpers for unit tests: a deterministic embedder and vault
//! scaffolding.

use std::{
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{embedder::Embedder, error::Result};

/// Fixed vocabulary for the stub embedder. Tests only use these words, so
/// two documents are similar exactly when they share words.
const VOCAB: &[&str] = &[
    "apple", "pie", "recipe", "banana", "bread", "unrelated", "text", "notes",
    "hello", "world", "alpha", "beta", "gamma", "delta", "one", "two",
];

/// Deterministic bag-of-words embedder.
///
/// Each vocabulary word owns one dimension; unknown words share a final
/// catch-all dimension. Counts embedding calls so tests can assert how
/// often documents were (re)embedded.
pub struct StubEmbedder {
    id: String,
    calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self::with_id("stub-model")
    }

    pub fn with_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for StubEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimension(&self) -> usize {
        VOCAB.len() + 1
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0f32; self.dimension()];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let slot = VOCAB
                .iter()
                .position(|w| *w == token)
                .unwrap_or(VOCAB.len());
            vector[slot] += 1.0;
        }
        Ok(vector)
    }
}

/// Write a note into the vault, creating parent directories as needed.
pub fn write_note(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

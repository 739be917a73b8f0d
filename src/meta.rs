use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Bumped whenever the persisted metadata layout changes; a mismatch at
/// load time forces a full rebuild.
pub const SCHEMA_VERSION: u32 = 1;

/// Bookkeeping for one indexed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Content fingerprint at the time the document was embedded.
    pub fingerprint: u64,
    /// Slot identifier in the vector index. Stable until the entry is
    /// removed; never reused within one index generation.
    pub label: u64,
}

/// Persisted mapping between document identity and vector index labels.
///
/// Serialized as JSON with a `BTreeMap`, so identical logical state always
/// produces identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub schema_version: u32,
    /// Identifier of the embedding model the vectors were produced with.
    pub model_id: String,
    /// Embedding dimension shared by every vector in this index.
    pub dimension: usize,
    /// Next label to hand out; only ever increments.
    pub next_label: u64,
    /// Vault-relative path -> entry.
    pub entries: BTreeMap<String, IndexEntry>,
}

impl IndexMeta {
    pub fn new(model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            model_id: model_id.into(),
            dimension,
            next_label: 0,
            entries: BTreeMap::new(),
        }
    }

    /// Hand out a fresh label, advancing the monotonic counter.
    pub fn allocate_label(&mut self) -> u64 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    pub fn labels(&self) -> BTreeSet<u64> {
        self.entries.values().map(|e| e.label).collect()
    }

    pub fn to_json(&self) -> crate::error::Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_monotonic() {
        let mut meta = IndexMeta::new("stub", 4);
        assert_eq!(meta.allocate_label(), 0);
        assert_eq!(meta.allocate_label(), 1);
        assert_eq!(meta.allocate_label(), 2);
        assert_eq!(meta.next_label, 3);
    }

    #[test]
    fn json_roundtrip() {
        let mut meta = IndexMeta::new("all-MiniLM-L6-v2", 384);
        let label = meta.allocate_label();
        meta.entries.insert(
            "notes/a.md".to_string(),
            IndexEntry {
                fingerprint: 0xdead_beef,
                label,
            },
        );

        let bytes = meta.to_json().unwrap();
        let restored: IndexMeta = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored, meta);
    }

    #[test]
    fn serialization_is_deterministic() {
        let mut a = IndexMeta::new("stub", 8);
        let mut b = IndexMeta::new("stub", 8);
        for meta in [&mut a, &mut b] {
            let label = meta.allocate_label();
            meta.entries
                .insert("z.md".into(), IndexEntry { fingerprint: 1, label });
            let label = meta.allocate_label();
            meta.entries
                .insert("a.md".into(), IndexEntry { fingerprint: 2, label });
        }
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }
}

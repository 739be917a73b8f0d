use crate::error::{Error, Result};

/// Capability interface for the vector index backing the semantic search.
///
/// Vectors are addressed by an opaque integer label assigned by the index
/// manager. Implementations own their persisted byte format; callers treat
/// the blob as opaque.
pub trait DenseIndex: Clone + Send + Sync + Sized {
    fn new(dimension: usize) -> Self;

    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace the vector for `label`.
    fn add(&mut self, label: u64, vector: &[f32]) -> Result<()>;

    /// Remove the vector for `label`. Returns whether it existed.
    fn remove(&mut self, label: u64) -> bool;

    /// Return the stored vector for `label`, if any.
    fn vector(&self, label: u64) -> Option<&[f32]>;

    /// Return up to `k` nearest labels with similarity scores, best first.
    fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)>;

    fn labels(&self) -> Vec<u64>;

    fn to_bytes(&self) -> Vec<u8>;

    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}

const MAGIC: &[u8; 4] = b"SVIX";
const FORMAT_VERSION: u32 = 1;

/// Header size: magic + format version + dimension + count, 4 bytes each.
const HEADER_SIZE: usize = 16;

/// Brute-force cosine similarity index over normalized vectors.
///
/// Vectors are L2-normalized on insert and queries are normalized on
/// search, so the inner product is the cosine similarity regardless of
/// what the embedding backend produces.
///
/// Binary format:
/// - 4 bytes: magic `SVIX`
/// - 4 bytes: format version (u32 LE)
/// - 4 bytes: dimension D (u32 LE)
/// - 4 bytes: entry count N (u32 LE)
/// - N entries of: label (u64 LE) + D * 4 bytes of f32 values
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    labels: Vec<u64>,
    // Row-major, one normalized row of `dimension` values per label.
    vectors: Vec<f32>,
}

impl FlatIndex {
    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    fn position(&self, label: u64) -> Option<usize> {
        self.labels.iter().position(|&l| l == label)
    }
}

impl DenseIndex for FlatIndex {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            labels: Vec::new(),
            vectors: Vec::new(),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.labels.len()
    }

    fn add(&mut self, label: u64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::InvalidArgument(format!(
                "embedding dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }

        let mut normalized = vector.to_vec();
        normalize(&mut normalized);

        match self.position(label) {
            Some(pos) => {
                let start = pos * self.dimension;
                self.vectors[start..start + self.dimension].copy_from_slice(&normalized);
            }
            None => {
                self.labels.push(label);
                self.vectors.extend_from_slice(&normalized);
            }
        }
        Ok(())
    }

    fn remove(&mut self, label: u64) -> bool {
        let Some(pos) = self.position(label) else {
            return false;
        };
        let last = self.labels.len() - 1;
        self.labels.swap_remove(pos);
        if pos != last {
            let (from, to) = (last * self.dimension, pos * self.dimension);
            for i in 0..self.dimension {
                self.vectors[to + i] = self.vectors[from + i];
            }
        }
        self.vectors.truncate(last * self.dimension);
        true
    }

    fn vector(&self, label: u64) -> Option<&[f32]> {
        self.position(label).map(|pos| self.row(pos))
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        if self.is_empty() || k == 0 || query.len() != self.dimension {
            return Vec::new();
        }

        let mut normalized = query.to_vec();
        normalize(&mut normalized);

        let mut scored: Vec<(u64, f32)> = self
            .labels
            .iter()
            .enumerate()
            .map(|(pos, &label)| (label, dot(&normalized, self.row(pos))))
            .collect();

        // Descending score; equal scores resolve by label for determinism.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    fn labels(&self) -> Vec<u64> {
        self.labels.clone()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let entry_size = 8 + self.dimension * 4;
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.labels.len() * entry_size);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.labels.len() as u32).to_le_bytes());
        for (pos, &label) in self.labels.iter().enumerate() {
            bytes.extend_from_slice(&label.to_le_bytes());
            bytes.extend_from_slice(bytemuck::cast_slice(self.row(pos)));
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::CorruptIndex("vector blob truncated".into()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(Error::CorruptIndex("vector blob has wrong magic".into()));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(Error::CorruptIndex(format!(
                "unsupported vector blob version {version}"
            )));
        }
        let dimension = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let count = u32::from_le_bytes(bytes[12..16].try_into().unwrap()) as usize;

        let entry_size = 8 + dimension * 4;
        if bytes.len() != HEADER_SIZE + count * entry_size {
            return Err(Error::CorruptIndex(format!(
                "vector blob length {} does not match {count} entries of dimension {dimension}",
                bytes.len()
            )));
        }

        let mut index = Self {
            dimension,
            labels: Vec::with_capacity(count),
            vectors: Vec::with_capacity(count * dimension),
        };
        let mut offset = HEADER_SIZE;
        for _ in 0..count {
            let label = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
            offset += 8;
            let row: Vec<f32> =
                bytemuck::pod_collect_to_vec(&bytes[offset..offset + dimension * 4]);
            offset += dimension * 4;
            index.labels.push(label);
            index.vectors.extend_from_slice(&row);
        }
        Ok(index)
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(entries: &[(u64, &[f32])]) -> FlatIndex {
        let mut index = FlatIndex::new(entries[0].1.len());
        for (label, vector) in entries {
            index.add(*label, vector).unwrap();
        }
        index
    }

    #[test]
    fn search_ranks_by_cosine() {
        let index = index_with(&[
            (0, &[1.0, 0.0, 0.0]),
            (1, &[0.8, 0.6, 0.0]),
            (2, &[0.0, 0.0, 1.0]),
        ]);

        let hits = index.search(&[1.0, 0.0, 0.0], 3);
        let labels: Vec<u64> = hits.iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec![0, 1, 2]);
        assert!(hits[0].1 > hits[1].1);
        assert!(hits[1].1 > hits[2].1);
    }

    #[test]
    fn vectors_are_normalized_on_insert() {
        let index = index_with(&[(7, &[0.0, 10.0])]);
        let hits = index.search(&[0.0, 1.0], 1);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn add_replaces_existing_label() {
        let mut index = index_with(&[(0, &[1.0, 0.0])]);
        index.add(0, &[0.0, 1.0]).unwrap();

        assert_eq!(index.len(), 1);
        let hits = index.search(&[0.0, 1.0], 1);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn remove_keeps_other_rows_intact() {
        let mut index = index_with(&[
            (0, &[1.0, 0.0]),
            (1, &[0.0, 1.0]),
            (2, &[1.0, 1.0]),
        ]);

        assert!(index.remove(0));
        assert!(!index.remove(0));
        assert_eq!(index.len(), 2);

        let hits = index.search(&[0.0, 1.0], 2);
        assert_eq!(hits[0].0, 1);
        assert!(index.vector(2).is_some());
        assert!(index.vector(0).is_none());
    }

    #[test]
    fn ties_resolve_by_label() {
        let index = index_with(&[(5, &[1.0, 0.0]), (3, &[1.0, 0.0])]);
        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits[0].0, 3);
        assert_eq!(hits[1].0, 5);
    }

    #[test]
    fn k_larger_than_len_returns_all() {
        let index = index_with(&[(0, &[1.0, 0.0])]);
        assert_eq!(index.search(&[1.0, 0.0], 10).len(), 1);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut index = FlatIndex::new(3);
        assert!(index.add(0, &[1.0, 0.0]).is_err());
    }

    #[test]
    fn bytes_roundtrip() {
        let index = index_with(&[
            (0, &[1.0, 0.0, 0.0]),
            (9, &[0.0, 1.0, 0.0]),
            (42, &[0.5, 0.5, 0.5]),
        ]);

        let restored = FlatIndex::from_bytes(&index.to_bytes()).unwrap();
        assert_eq!(restored.dimension(), 3);
        assert_eq!(restored.len(), 3);
        let mut labels = restored.labels();
        labels.sort_unstable();
        assert_eq!(labels, vec![0, 9, 42]);
        assert_eq!(restored.vector(9), index.vector(9));
    }

    #[test]
    fn empty_roundtrip() {
        let index = FlatIndex::new(4);
        let restored = FlatIndex::from_bytes(&index.to_bytes()).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.dimension(), 4);
    }

    #[test]
    fn truncated_blob_is_corrupt() {
        let index = index_with(&[(0, &[1.0, 0.0])]);
        let bytes = index.to_bytes();
        match FlatIndex::from_bytes(&bytes[..bytes.len() - 3]) {
            Err(Error::CorruptIndex(_)) => {}
            other => panic!("expected CorruptIndex, got {other:?}"),
        }
    }

    #[test]
    fn wrong_magic_is_corrupt() {
        let mut bytes = FlatIndex::new(2).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            FlatIndex::from_bytes(&bytes),
            Err(Error::CorruptIndex(_))
        ));
    }

    #[test]
    fn zero_vector_scores_zero() {
        let index = index_with(&[(0, &[0.0, 0.0]), (1, &[1.0, 0.0])]);
        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[1].1, 0.0);
    }
}

use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    flat_index::DenseIndex,
    meta::IndexMeta,
};

/// Reserved directory inside the vault holding all persisted index state.
pub const STORAGE_DIR: &str = ".semantic-search";

const META_FILE: &str = "index_meta.json";
const VECTOR_FILE: &str = "vector_index.bin";

/// Persistence unit for index metadata and the vector blob.
///
/// The two files are committed together: both are written to temporary
/// names, then renamed into place with the metadata last. A crash between
/// the renames leaves the label sets disagreeing, which [`IndexStore::load`]
/// reports as `CorruptIndex` so the caller can rebuild.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(vault_root: &Path) -> Self {
        Self {
            dir: vault_root.join(STORAGE_DIR),
        }
    }

    pub fn meta_path(&self) -> PathBuf {
        self.dir.join(META_FILE)
    }

    pub fn vector_path(&self) -> PathBuf {
        self.dir.join(VECTOR_FILE)
    }

    /// Whether a previously persisted index exists.
    pub fn exists(&self) -> bool {
        self.meta_path().is_file() && self.vector_path().is_file()
    }

    /// Load only the metadata record, without consistency checks against
    /// the vector blob. Used for cheap status reporting.
    pub fn load_meta(&self) -> Result<IndexMeta> {
        let path = self.meta_path();
        if !path.is_file() {
            return Err(Error::NotFound {
                kind: "index",
                name: path.display().to_string(),
            });
        }
        let bytes = std::fs::read(&path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::CorruptIndex(format!("metadata unreadable: {e}")))
    }

    /// Load and cross-check both halves of the persistence unit.
    pub fn load<V: DenseIndex>(&self) -> Result<(IndexMeta, V)> {
        if !self.exists() {
            return Err(Error::NotFound {
                kind: "index",
                name: self.dir.display().to_string(),
            });
        }

        let meta = self.load_meta()?;
        let blob = std::fs::read(self.vector_path())?;
        let index = V::from_bytes(&blob)?;

        if index.dimension() != meta.dimension {
            return Err(Error::CorruptIndex(format!(
                "vector blob dimension {} does not match metadata dimension {}",
                index.dimension(),
                meta.dimension
            )));
        }

        let mut index_labels = index.labels();
        index_labels.sort_unstable();
        let meta_labels: Vec<u64> = meta.labels().into_iter().collect();
        if index_labels != meta_labels {
            return Err(Error::CorruptIndex(
                "metadata and vector blob disagree on label set".into(),
            ));
        }

        Ok((meta, index))
    }

    /// Atomically persist metadata and vector blob as one unit.
    ///
    /// Either the previous state or the new state is observable after a
    /// crash; a torn commit is detectable at load time.
    pub fn commit(&self, meta: &IndexMeta, index_bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Persistence(format!("cannot create {STORAGE_DIR}: {e}")))?;

        let meta_bytes = meta.to_json()?;
        let vector_tmp = self.dir.join(format!("{VECTOR_FILE}.tmp"));
        let meta_tmp = self.dir.join(format!("{META_FILE}.tmp"));

        std::fs::write(&vector_tmp, index_bytes)
            .map_err(|e| Error::Persistence(format!("writing vector blob: {e}")))?;
        std::fs::write(&meta_tmp, &meta_bytes)
            .map_err(|e| Error::Persistence(format!("writing metadata: {e}")))?;

        std::fs::rename(&vector_tmp, self.vector_path())
            .map_err(|e| Error::Persistence(format!("committing vector blob: {e}")))?;
        std::fs::rename(&meta_tmp, self.meta_path())
            .map_err(|e| Error::Persistence(format!("committing metadata: {e}")))?;

        Ok(())
    }
}

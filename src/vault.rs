use std::{
    collections::hash_map::DefaultHasher,
    hash::Hasher,
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

use crate::error::{Error, Result};

/// File extensions the indexer considers documents.
const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown"];

/// A vault document at a point in time.
#[derive(Debug, Clone)]
pub struct Document {
    /// Vault-relative path with forward-slash separators.
    pub path: String,
    /// Full UTF-8 content.
    pub content: String,
    /// Content fingerprint; identical bytes always produce the same value.
    pub fingerprint: u64,
    /// Last modification time as seconds since the Unix epoch.
    pub mtime: u64,
}

/// Reads documents out of the vault directory tree.
///
/// Hidden files and directories (names starting with `.`) are skipped,
/// which also keeps the index's own `.semantic-search` storage directory
/// out of the document set.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the vault and return every supported document, sorted by path.
    ///
    /// Unreadable or non-UTF-8 files are skipped with a warning; one bad
    /// file never aborts the walk.
    pub fn list(&self) -> Result<Vec<Document>> {
        let root = self.root.canonicalize()?;
        let mut paths = Vec::new();
        walk_dir(&root, &root, &mut paths)?;
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            match self.read(&path) {
                Ok(doc) => documents.push(doc),
                Err(err) => {
                    tracing::warn!("skipping {path}: {err}");
                }
            }
        }
        Ok(documents)
    }

    /// Read a single document by vault-relative path.
    ///
    /// Fails with `NotFound` if the file is missing or not a supported
    /// document type, and with an I/O error if it cannot be decoded.
    pub fn read(&self, path: &str) -> Result<Document> {
        let absolute = self.root.join(path);
        if !is_supported(&absolute) || !absolute.is_file() {
            return Err(Error::NotFound {
                kind: "document",
                name: path.to_string(),
            });
        }

        let content = std::fs::read_to_string(&absolute)?;
        let mtime = std::fs::metadata(&absolute)?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Ok(Document {
            path: path.to_string(),
            fingerprint: fingerprint(&content),
            content,
            mtime,
        })
    }

    /// Turn an absolute or vault-relative path into the normalized relative
    /// form used as document identity. Returns `None` for paths outside the
    /// vault.
    ///
    /// Deleted files cannot be canonicalized, so absolute paths fall back
    /// to stripping the root prefix lexically; their identity must survive
    /// deletion for removal hints and stored-vector lookups.
    pub fn relativize(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            let root = self.root.canonicalize().ok()?;
            match path.canonicalize() {
                Ok(canonical) => canonical.strip_prefix(&root).ok()?.to_path_buf(),
                Err(_) => path
                    .strip_prefix(&self.root)
                    .or_else(|_| path.strip_prefix(&root))
                    .ok()?
                    .to_path_buf(),
            }
        } else {
            path.to_path_buf()
        };
        Some(normalize_relative(&relative))
    }
}

/// Fingerprint of document content: SipHash-2-4 over the raw bytes.
///
/// `DefaultHasher::new()` uses fixed keys, so the value is stable across
/// processes and safe to persist.
pub fn fingerprint(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(content.as_bytes());
    hasher.finish()
}

pub(crate) fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
}

fn normalize_relative(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

fn walk_dir(root: &Path, current: &Path, results: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        // Hidden entries, including the index storage directory.
        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_dir(root, &entry.path(), results)?;
        } else if file_type.is_file() && is_supported(&entry.path()) {
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(&entry.path())
                .to_path_buf();
            results.push(normalize_relative(&relative));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_markdown_only() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("note.md"), "# Hello").unwrap();
        std::fs::write(tmp.path().join("other.markdown"), "Hello").unwrap();
        std::fs::write(tmp.path().join("image.png"), "binary").unwrap();
        std::fs::write(tmp.path().join("readme.txt"), "text").unwrap();

        let store = DocumentStore::new(tmp.path());
        let docs = store.list().unwrap();
        let paths: Vec<_> = docs.iter().map(|d| d.path.clone()).collect();
        assert_eq!(paths, vec!["note.md", "other.markdown"]);
    }

    #[test]
    fn skips_hidden_and_storage_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = tmp.path().join(".semantic-search");
        std::fs::create_dir(&storage).unwrap();
        std::fs::write(storage.join("stale.md"), "internal").unwrap();
        std::fs::write(tmp.path().join(".hidden.md"), "secret").unwrap();
        std::fs::write(tmp.path().join("visible.md"), "hello").unwrap();

        let store = DocumentStore::new(tmp.path());
        let docs = store.list().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].path, "visible.md");
    }

    #[test]
    fn recurses_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("projects");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("deep.md"), "deep").unwrap();
        std::fs::write(tmp.path().join("z.md"), "z").unwrap();
        std::fs::write(tmp.path().join("a.md"), "a").unwrap();

        let store = DocumentStore::new(tmp.path());
        let paths: Vec<_> = store.list().unwrap().into_iter().map(|d| d.path).collect();
        assert_eq!(paths, vec!["a.md", "projects/deep.md", "z.md"]);
    }

    #[test]
    fn read_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(tmp.path());
        match store.read("ghost.md") {
            Err(Error::NotFound { kind, name }) => {
                assert_eq!(kind, "document");
                assert_eq!(name, "ghost.md");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn read_unsupported_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("data.csv"), "a,b").unwrap();
        let store = DocumentStore::new(tmp.path());
        assert!(store.read("data.csv").is_err());
    }

    #[test]
    fn skips_undecodable_files_in_list() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bad.md"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(tmp.path().join("good.md"), "fine").unwrap();

        let store = DocumentStore::new(tmp.path());
        let docs = store.list().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].path, "good.md");
    }

    #[test]
    fn fingerprint_tracks_content_not_mtime() {
        assert_eq!(fingerprint("apple"), fingerprint("apple"));
        assert_ne!(fingerprint("apple"), fingerprint("apple pie"));
    }

    #[test]
    fn relativize_absolute_and_relative() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("note.md"), "x").unwrap();
        let store = DocumentStore::new(tmp.path());

        let abs = tmp.path().join("note.md");
        assert_eq!(store.relativize(&abs).unwrap(), "note.md");
        assert_eq!(
            store.relativize(Path::new("sub/note.md")).unwrap(),
            "sub/note.md"
        );
    }

    #[test]
    fn relativize_deleted_absolute_path_falls_back_lexically() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(tmp.path());

        // Nothing at this path, as after a deletion.
        let gone = tmp.path().join("notes").join("gone.md");
        assert_eq!(store.relativize(&gone).unwrap(), "notes/gone.md");
    }

    #[test]
    fn relativize_rejects_outside_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        std::fs::write(other.path().join("foreign.md"), "x").unwrap();

        let store = DocumentStore::new(tmp.path());
        assert!(store.relativize(&other.path().join("foreign.md")).is_none());
    }
}

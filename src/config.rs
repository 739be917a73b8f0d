use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{Error, Result};

/// Embedding model used when none is configured.
pub const DEFAULT_MODEL_ID: &str = "all-MiniLM-L6-v2";

/// Cosine similarity above which two documents count as near-duplicates.
pub const DEFAULT_DUPLICATE_THRESHOLD: f32 = 0.85;

/// Quiet window applied to filesystem events before a sync runs.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Configuration for one vault index.
///
/// All knobs are explicit; environment variables are only consulted by
/// [`resolve_vault`] at the CLI edge, never by the core.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Root directory of the markdown vault.
    pub vault_root: PathBuf,
    /// Identifier of the embedding model the index is built with.
    pub model_id: String,
    /// Default similarity threshold for duplicate detection.
    pub duplicate_threshold: f32,
    /// Debounce window for the change watcher.
    pub debounce: Duration,
}

impl IndexConfig {
    pub fn new(vault_root: impl Into<PathBuf>) -> Self {
        Self {
            vault_root: vault_root.into(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_duplicate_threshold(mut self, threshold: f32) -> Self {
        self.duplicate_threshold = threshold;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Resolve the vault root from, in order of priority:
/// 1. An explicit path (from --vault)
/// 2. The VAULT_PATH environment variable
pub fn resolve_vault(explicit: Option<&Path>) -> Result<PathBuf> {
    let root = if let Some(path) = explicit {
        path.to_path_buf()
    } else if let Ok(val) = std::env::var("VAULT_PATH") {
        PathBuf::from(val)
    } else {
        return Err(Error::Config(
            "no vault configured: pass --vault or set VAULT_PATH".into(),
        ));
    };

    if !root.is_dir() {
        return Err(Error::Config(format!(
            "vault root is not a directory: {}",
            root.display()
        )));
    }

    Ok(root)
}

use std::sync::Arc;

use serde::Serialize;

use crate::{
    error::{Error, Result},
    flat_index::{DenseIndex, FlatIndex},
    indexer::Indexer,
};

/// Number of results returned when the caller does not ask for a count.
pub const DEFAULT_TOP_K: usize = 5;

/// One search or duplicate-detection result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Vault-relative path of the matching document.
    pub path: String,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub score: f32,
}

/// Validated query front door shared by the CLI and the MCP server.
///
/// Every call reads one consistent snapshot; a sync finishing mid-query
/// never mixes old and new state into a result list.
#[derive(Debug, Clone)]
pub struct QueryService<V: DenseIndex = FlatIndex> {
    indexer: Arc<Indexer<V>>,
}

impl<V: DenseIndex> QueryService<V> {
    pub fn new(indexer: Arc<Indexer<V>>) -> Self {
        Self { indexer }
    }

    pub fn indexer(&self) -> &Arc<Indexer<V>> {
        &self.indexer
    }

    /// Free-text search for the `top_k` most similar documents.
    pub fn search_related(&self, query: &str, top_k: Option<usize>) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidArgument("query must not be empty".into()));
        }
        self.indexer.search(query, top_k.unwrap_or(DEFAULT_TOP_K))
    }

    /// List indexed documents whose similarity to `path` meets the
    /// threshold. Without an explicit threshold the configured default
    /// applies.
    pub fn check_duplicates(&self, path: &str, threshold: Option<f32>) -> Result<Vec<SearchHit>> {
        if path.trim().is_empty() {
            return Err(Error::InvalidArgument("file path must not be empty".into()));
        }
        let threshold = threshold.unwrap_or(self.indexer.config().duplicate_threshold);
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(Error::InvalidArgument(format!(
                "threshold must be in (0, 1], got {threshold}"
            )));
        }
        self.indexer.find_duplicates(path, threshold)
    }
}

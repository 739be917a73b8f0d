//! semvault - semantic search and duplicate detection for markdown vaults.
//!
//! semvault maintains a persistent vector index over the markdown files in a
//! vault directory, using [fastembed](https://github.com/Anush008/fastembed-rs)
//! sentence embeddings and brute-force cosine similarity. The index lives
//! inside the vault under `.semantic-search/` and is reconciled incrementally:
//! only documents whose content actually changed are re-embedded.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use semvault::{FastEmbedder, IndexConfig, Indexer, QueryService};
//!
//! let config = IndexConfig::new("/home/me/vault");
//! let embedder = Arc::new(FastEmbedder::new(&config.model_id).unwrap());
//! let indexer: Arc<Indexer> = Arc::new(Indexer::new(config, embedder));
//! indexer.initialize().unwrap();
//!
//! let query = QueryService::new(indexer);
//! for hit in query.search_related("rust ownership", Some(5)).unwrap() {
//!     println!("{:.3} {}", hit.score, hit.path);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod embedder;
pub mod error;
pub mod flat_index;
pub mod indexer;
pub mod mcp;
pub mod meta;
pub mod query;
pub mod store;
pub mod vault;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_util;

pub use config::IndexConfig;
pub use embedder::{Embedder, FastEmbedder};
pub use error::{Error, Result};
pub use flat_index::{DenseIndex, FlatIndex};
pub use indexer::{IndexState, Indexer, SyncReport};
pub use meta::IndexMeta;
pub use query::{QueryService, SearchHit};
pub use store::IndexStore;
pub use vault::DocumentStore;
pub use watcher::VaultWatcher;

use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::error::{Error, Result};

/// Capability interface for the external embedding model.
///
/// Implementations map UTF-8 text to a fixed-length f32 vector. The
/// dimension and model identifier must stay constant for the lifetime of
/// one index; a change in either forces a full rebuild.
pub trait Embedder: Send + Sync {
    /// Stable identifier persisted with the index metadata.
    fn id(&self) -> &str;

    /// Output dimension of this model.
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Default backend: a local fastembed model, downloaded on first use.
pub struct FastEmbedder {
    // fastembed's embed() takes &mut self.
    model: Mutex<TextEmbedding>,
    model_id: String,
    dimension: usize,
}

impl FastEmbedder {
    pub fn new(model_id: &str) -> Result<Self> {
        let kind = parse_model_id(model_id)?;
        let options = InitOptions::new(kind).with_show_download_progress(true);
        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| Error::Embedding(e.to_string()))?;

        // Probe the output dimension once; fastembed does not expose it
        // before the first inference.
        let dimension = model
            .embed(vec!["dimension probe"], None)
            .map_err(|e| Error::Embedding(e.to_string()))?
            .into_iter()
            .next()
            .map(|v| v.len())
            .ok_or_else(|| Error::Embedding("model returned no embedding".into()))?;

        Ok(Self {
            model: Mutex::new(model),
            model_id: model_id.to_string(),
            dimension,
        })
    }
}

impl Embedder for FastEmbedder {
    fn id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self
            .model
            .lock()
            .map_err(|_| Error::Embedding("model lock poisoned".into()))?;
        model
            .embed(vec![text], None)
            .map_err(|e| Error::Embedding(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("model returned no embedding".into()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = self
            .model
            .lock()
            .map_err(|_| Error::Embedding("model lock poisoned".into()))?;
        model
            .embed(texts.to_vec(), None)
            .map_err(|e| Error::Embedding(e.to_string()))
    }
}

impl std::fmt::Debug for FastEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedder")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

fn parse_model_id(model_id: &str) -> Result<EmbeddingModel> {
    match model_id {
        "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        other => Err(Error::Config(format!(
            "unsupported embedding model: {other}"
        ))),
    }
}

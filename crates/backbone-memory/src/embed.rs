use std::sync::Mutex;

use backbone_core::error::{BackboneError, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

/// Sentence-embedding seam (spec.md §4.4 "embed each memory ... with a
/// sentence-embedding model"). A trait keeps the clustering code in
/// `cluster.rs` independent of the concrete model, and lets tests swap in a
/// deterministic stub. Per DESIGN.md, the concrete model is a per-process
/// singleton — loading it is expensive enough that per-call construction
/// would dominate dedup latency.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// `fastembed`-backed embedder, grounded on `own-ai-app`'s
/// `memory/long_term.rs` ("Long-term memory with vector search using
/// fastembed"). Uses the default all-MiniLM model rather than that repo's
/// Qwen3 variant — nothing here needs a specific embedding model, just a
/// consistent one.
pub struct FastEmbedEmbedder {
    model: Mutex<TextEmbedding>,
}

impl FastEmbedEmbedder {
    pub fn try_new() -> Result<Self> {
        let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
            .map_err(|e| BackboneError::Internal(format!("failed to load embedding model: {e}")))?;
        Ok(Self { model: Mutex::new(model) })
    }
}

impl Embedder for FastEmbedEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.lock().unwrap();
        model
            .embed(texts.to_vec(), None)
            .map_err(|e| BackboneError::Internal(format!("embedding failed: {e}")))
    }
}

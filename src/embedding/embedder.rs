//! Embedding model wrapper for Rig + Ollama.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client as ReqwestClient;
use rig::client::{EmbeddingsClient, Nothing};
use rig::embeddings::EmbeddingModel;
use rig::providers::ollama;

use crate::core::config::EmbeddingConfig;
use crate::core::errors::{MemoryError, MemoryResult};

/// Boxed future type for embedder operations.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstraction over embedding models.
///
/// The manager and vector store only see this trait, so hosts can inject
/// any provider and tests can inject deterministic embedders.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a fixed-length vector.
    ///
    /// # Errors
    /// Returns an error if the embedding request fails.
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, MemoryResult<Vec<f32>>>;
    /// Return embedding dimensionality.
    fn ndims(&self) -> usize;
    /// Return the model name for stats and logs.
    fn model_name(&self) -> &str;
}

type OllamaEmbeddingModel = ollama::EmbeddingModel<ReqwestClient>;

/// Ollama embedder using the Rig provider.
#[derive(Clone)]
pub struct OllamaEmbedder {
    model: OllamaEmbeddingModel,
    model_name: String,
    ndims: usize,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder from config.
    ///
    /// # Errors
    /// Returns an error if the client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> MemoryResult<Self> {
        let mut builder = ollama::Client::<ReqwestClient>::builder().api_key(Nothing);
        if let Some(base_url) = &config.base_url {
            builder = builder.base_url(base_url);
        }
        let client = builder.build().map_err(MemoryError::from)?;
        let model = client.embedding_model_with_ndims(config.model.clone(), config.ndims);
        Ok(Self {
            model,
            model_name: config.model.clone(),
            ndims: config.ndims,
        })
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, MemoryResult<Vec<f32>>> {
        let text = text.to_string();
        Box::pin(async move {
            let embedding = self
                .model
                .embed_text(&text)
                .await
                .map_err(MemoryError::Embedding)?;
            Ok(embedding.vec.into_iter().map(|v| v as f32).collect())
        })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

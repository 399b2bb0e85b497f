//! Embedding providers.
//!
//! The [`Embedder`] trait is the seam between the pipeline and whichever
//! provider turns chunk text into vectors. Dimensionality is fixed per
//! provider and validated downstream at upsert.

pub mod hashed;
pub mod openai;

pub use hashed::HashedEmbedder;
pub use openai::OpenAiEmbedder;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{EmbeddingConfig, EmbeddingProvider};

/// Errors from embedding providers.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding provider error ({status}): {body}")]
    Provider { status: u16, body: String },

    #[error("provider returned {actual} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error("missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("invalid provider configuration: {0}")]
    Config(String),
}

/// Result type for embedding operations.
pub type EmbedResult<T> = Result<T, EmbedError>;

/// Trait for converting text into fixed-dimensionality vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Fixed embedding dimension for this provider.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[&str]) -> EmbedResult<Vec<Vec<f32>>>;

    /// Embed a single query string.
    async fn embed_query(&self, query: &str) -> EmbedResult<Vec<f32>> {
        let mut vectors = self.embed(&[query]).await?;
        if vectors.len() != 1 {
            return Err(EmbedError::CountMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }
}

/// Construct the configured provider.
pub fn from_config(config: &EmbeddingConfig) -> EmbedResult<Arc<dyn Embedder>> {
    match config.provider {
        EmbeddingProvider::Openai => Ok(Arc::new(OpenAiEmbedder::from_config(config)?)),
        EmbeddingProvider::Hashed => Ok(Arc::new(HashedEmbedder::new(config.dimension))),
    }
}

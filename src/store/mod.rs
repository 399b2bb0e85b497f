//! Pluggable vector-store abstraction.
//!
//! Exactly one concrete backend is active per deployment, chosen once at
//! construction from configuration. Backends share the metadata filter
//! language in [`filter`]; callers that want content-only results inject
//! the bookkeeping exclusion via [`content_filter`] — the store itself
//! never filters implicitly.

pub mod cache;
pub mod disk;
pub mod filter;
pub mod memory;

pub use cache::CachedStore;
pub use disk::DiskStore;
pub use filter::Filter;
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};

/// Metadata key marking bookkeeping records.
pub const FILE_METADATA_KEY: &str = "is_file_metadata";

/// Errors from vector store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("vector dimension mismatch: expected {expected}, got {actual} (id {id})")]
    Dimension {
        expected: usize,
        actual: usize,
        id: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence error: {0}")]
    Persist(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// A vector with its id and metadata, as stored.
///
/// Ids are deterministic, so upserting the same id overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Value,
}

/// One ranked query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub id: String,
    pub score: f32,
    pub metadata: Value,
}

/// Trait for vector storage and nearest-neighbor search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Fixed dimension this store accepts.
    fn dimension(&self) -> usize;

    /// Insert or overwrite records by id.
    async fn upsert(&self, records: Vec<VectorRecord>) -> StoreResult<()>;

    /// Return up to `top_k` records ranked by cosine similarity, restricted
    /// to records whose metadata matches `filter`.
    async fn query(
        &self,
        vector: &[f32],
        filter: Option<&Filter>,
        top_k: usize,
    ) -> StoreResult<Vec<Match>>;

    /// Number of stored records.
    async fn count(&self) -> StoreResult<usize>;
}

/// Filter clause excluding bookkeeping records from content queries.
///
/// Injected by callers, not by the store.
pub fn content_filter() -> Filter {
    Filter::ne(FILE_METADATA_KEY, Value::Bool(true))
}

/// Open the backend selected by configuration, optionally wrapped in the
/// query cache.
pub fn open_store(config: &StoreConfig, dimension: usize) -> StoreResult<Arc<dyn VectorStore>> {
    let backend: Arc<dyn VectorStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new(dimension)),
        StoreBackend::Disk => Arc::new(DiskStore::open(&config.path, dimension)?),
    };

    if config.cache {
        Ok(Arc::new(CachedStore::new(backend)))
    } else {
        Ok(backend)
    }
}

/// Cosine similarity of two vectors; 0.0 on length mismatch or zero norm.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_content_filter_excludes_bookkeeping() {
        let filter = content_filter();
        assert!(!filter.matches(&json!({"is_file_metadata": true})));
        assert!(filter.matches(&json!({"is_file_metadata": false})));
        // Records without the key are content records.
        assert!(filter.matches(&json!({"kind": "path"})));
    }
}

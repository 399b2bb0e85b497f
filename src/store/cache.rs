//! Query caching decorator.
//!
//! Wraps any [`VectorStore`] and short-circuits repeated queries. The cache
//! key is a stable hash of the query vector, the filter, and `top_k`.
//! Entries live until process exit; an empty result is never cached, so a
//! query that arrives before any data exists cannot pin a false negative.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use super::{Filter, Match, StoreResult, VectorRecord, VectorStore};

/// Hit/miss counters for the query cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Caching decorator over a store backend.
pub struct CachedStore {
    backend: Arc<dyn VectorStore>,
    cache: RwLock<HashMap<[u8; 32], Vec<Match>>>,
    stats: RwLock<CacheStats>,
}

impl CachedStore {
    /// Wrap a backend with a query cache.
    pub fn new(backend: Arc<dyn VectorStore>) -> Self {
        Self {
            backend,
            cache: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Current hit/miss counters.
    pub async fn stats(&self) -> CacheStats {
        *self.stats.read().await
    }

    /// Number of cached queries.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// True when nothing has been cached yet.
    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Stable key over (vector bits, filter JSON, top_k).
    fn cache_key(vector: &[f32], filter: Option<&Filter>, top_k: usize) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for value in vector {
            hasher.update(value.to_le_bytes());
        }
        hasher.update([0xff]);
        if let Some(filter) = filter {
            hasher.update(filter.0.to_string().as_bytes());
        }
        hasher.update([0xff]);
        hasher.update((top_k as u64).to_le_bytes());
        hasher.finalize().into()
    }
}

#[async_trait]
impl VectorStore for CachedStore {
    fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> StoreResult<()> {
        self.backend.upsert(records).await
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: Option<&Filter>,
        top_k: usize,
    ) -> StoreResult<Vec<Match>> {
        let key = Self::cache_key(vector, filter, top_k);

        if let Some(cached) = self.cache.read().await.get(&key) {
            self.stats.write().await.hits += 1;
            debug!(target: "store", "query cache hit");
            return Ok(cached.clone());
        }

        self.stats.write().await.misses += 1;
        let matches = self.backend.query(vector, filter, top_k).await?;

        // An empty result is the cold-start sentinel: data may simply not
        // exist yet, so it must not be pinned.
        if !matches.is_empty() {
            self.cache.write().await.insert(key, matches.clone());
        }

        Ok(matches)
    }

    async fn count(&self) -> StoreResult<usize> {
        self.backend.count().await
    }
}

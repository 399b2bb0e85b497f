//! In-memory store backend.
//!
//! Brute-force cosine similarity over a record map. Small-corpus friendly
//! and the reference semantics for the disk backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Filter, Match, StoreError, StoreResult, VectorRecord, VectorStore, cosine_similarity};

/// In-memory vector store.
pub struct MemoryStore {
    dimension: usize,
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl MemoryStore {
    /// Create an empty store with the given embedding dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a store from existing records (used by the disk backend on load).
    pub(crate) fn from_records(dimension: usize, records: Vec<VectorRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            dimension,
            records: RwLock::new(map),
        }
    }

    pub(crate) async fn snapshot(&self) -> Vec<VectorRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> StoreResult<()> {
        for record in &records {
            if record.values.len() != self.dimension {
                return Err(StoreError::Dimension {
                    expected: self.dimension,
                    actual: record.values.len(),
                    id: record.id.clone(),
                });
            }
        }

        let mut map = self.records.write().await;
        let count = records.len();
        for record in records {
            map.insert(record.id.clone(), record);
        }
        debug!(target: "store", upserted = count, total = map.len(), "memory upsert");
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: Option<&Filter>,
        top_k: usize,
    ) -> StoreResult<Vec<Match>> {
        let map = self.records.read().await;

        let mut matches: Vec<Match> = map
            .values()
            .filter(|record| filter.is_none_or(|f| f.matches(&record.metadata)))
            .map(|record| Match {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.values),
                metadata: record.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);

        Ok(matches)
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.records.read().await.len())
    }
}

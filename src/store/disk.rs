//! Disk-persisted store backend.
//!
//! Same query semantics as the memory backend, with records persisted to a
//! JSON file after every upsert and loaded back on open. Writes go through
//! a temp file and rename so a crash mid-write cannot corrupt the store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{Filter, Match, StoreError, StoreResult, VectorRecord, VectorStore};
use crate::store::memory::MemoryStore;

const RECORDS_FILE: &str = "records.json";

/// Vector store persisted under a base directory.
pub struct DiskStore {
    inner: MemoryStore,
    records_path: PathBuf,
}

impl DiskStore {
    /// Open or create a store at `base_path`.
    pub fn open(base_path: impl AsRef<Path>, dimension: usize) -> StoreResult<Self> {
        let base_path = base_path.as_ref();
        std::fs::create_dir_all(base_path)?;

        let records_path = base_path.join(RECORDS_FILE);
        let records = if records_path.exists() {
            let content = std::fs::read_to_string(&records_path)?;
            serde_json::from_str(&content)
                .map_err(|e| StoreError::Persist(format!("failed to parse {RECORDS_FILE}: {e}")))?
        } else {
            Vec::new()
        };

        Ok(Self {
            inner: MemoryStore::from_records(dimension, records),
            records_path,
        })
    }

    async fn persist(&self) -> StoreResult<()> {
        let records = self.inner.snapshot().await;
        let content = serde_json::to_string(&records)
            .map_err(|e| StoreError::Persist(format!("failed to serialize records: {e}")))?;

        let tmp_path = self.records_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.records_path)?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for DiskStore {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> StoreResult<()> {
        self.inner.upsert(records).await?;
        self.persist().await
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: Option<&Filter>,
        top_k: usize,
    ) -> StoreResult<Vec<Match>> {
        self.inner.query(vector, filter, top_k).await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.inner.count().await
    }
}

//! Ingestion orchestrator.
//!
//! Takes a parsed specification document through chunking, batch embedding,
//! and store upserts while driving the shared [`StatusHandle`]. Batches are
//! committed sequentially; a mid-job failure keeps the batches already
//! upserted and marks the job failed.

pub mod status;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::embedding::{EmbedError, Embedder};
use crate::spec::{SpecDocument, SpecError, SpecFormat, chunk_document};
use crate::store::{FILE_METADATA_KEY, Filter, StoreError, VectorRecord, VectorStore};
use crate::tabular::{RowError, TabularError, process_tabular};

pub use status::{EmbeddedFile, JobState, ProcessingStatus, StatusHandle};

/// Default number of chunks embedded per provider call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Record id prefix for per-file bookkeeping records.
const FILE_METADATA_ID_PREFIX: &str = "file-meta";

/// Magnitude of the placeholder vector stored on bookkeeping records.
const PLACEHOLDER_MAGNITUDE: f32 = 1e-8;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("spec error: {0}")]
    Spec(#[from] SpecError),
    #[error("tabular error: {0}")]
    Tabular(#[from] TabularError),
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Outcome of an ingestion attempt.
#[derive(Debug)]
pub enum IngestOutcome {
    /// The document was chunked, embedded, and stored.
    Completed {
        chunk_count: usize,
        /// Rows skipped by the tabular processor (empty for structured specs).
        row_errors: Vec<RowError>,
    },
    /// Another ingestion holds the single processing slot.
    AlreadyProcessing,
}

/// Chunking, embedding, and storage for one document at a time.
pub struct IngestService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    status: StatusHandle,
    batch_size: usize,
}

impl IngestService {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            status: StatusHandle::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Shared status handle, cloneable for readers.
    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Ingest one document end to end.
    ///
    /// Returns [`IngestOutcome::AlreadyProcessing`] without side effects when
    /// another job holds the slot. Any failure after the slot is claimed
    /// marks the status failed and propagates the error; batches committed
    /// before the failure stay in the store.
    pub async fn ingest(
        &self,
        document: &SpecDocument,
        file_name: &str,
    ) -> IngestResult<IngestOutcome> {
        if !self.status.try_begin(file_name) {
            warn!(file = file_name, "ingestion rejected, a job is already processing");
            return Ok(IngestOutcome::AlreadyProcessing);
        }

        match self.run_job(document, file_name).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.status.fail(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_job(
        &self,
        document: &SpecDocument,
        file_name: &str,
    ) -> IngestResult<IngestOutcome> {
        // Step 1: chunk per format.
        let (chunks, row_errors) = match document.format {
            SpecFormat::Structured => {
                let tree = document.parse_tree()?;
                (chunk_document(&tree, &document.spec_id), Vec::new())
            }
            SpecFormat::Tabular => {
                let output = process_tabular(&document.content)?;
                for row_error in &output.errors {
                    warn!(
                        file = file_name,
                        line = row_error.line_number,
                        endpoint = %row_error.endpoint,
                        "skipped tabular row: {}",
                        row_error.error
                    );
                }
                for warning in &output.warnings {
                    warn!(
                        file = file_name,
                        line = warning.line_number,
                        endpoint = %warning.endpoint,
                        "degraded tabular row: {}",
                        warning.error
                    );
                }
                (output.chunks, output.errors)
            }
        };

        let chunk_count = chunks.len();
        self.status.set_total(chunk_count);
        info!(
            file = file_name,
            spec_id = %document.spec_id,
            chunks = chunk_count,
            "ingestion started"
        );

        // Step 2: embed and upsert batch by batch, advancing progress after
        // each committed batch.
        for (batch_index, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = self.embedder.embed(&texts).await.map_err(|e| {
                warn!(file = file_name, batch = batch_index, "embedding batch failed: {e}");
                e
            })?;

            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, values)| VectorRecord {
                    id: chunk.id.clone(),
                    values,
                    metadata: chunk_metadata(chunk, &document.spec_id, file_name),
                })
                .collect();

            self.store.upsert(records).await?;
            self.status.record_batch(batch.len());
            debug!(batch = batch_index, size = batch.len(), "batch committed");
        }

        // Step 3: bookkeeping record, then mark complete.
        let embedded_at = Utc::now();
        self.store
            .upsert(vec![file_metadata_record(
                &document.spec_id,
                file_name,
                chunk_count,
                embedded_at,
                self.store.dimension(),
            )])
            .await?;

        self.status.complete(EmbeddedFile {
            spec_id: document.spec_id.clone(),
            file_name: file_name.to_string(),
            total_chunks: chunk_count,
            embedded_at,
        });
        info!(file = file_name, chunks = chunk_count, "ingestion completed");

        Ok(IngestOutcome::Completed {
            chunk_count,
            row_errors,
        })
    }

    /// Rebuild the embedded-files history from bookkeeping records.
    ///
    /// The probe vector is all zeros: every score is 0.0 and the metadata
    /// filter does the selection. Returns the number of entries restored.
    pub async fn heal_history(&self) -> IngestResult<usize> {
        let probe = vec![0.0; self.store.dimension()];
        let filter = Filter::eq(FILE_METADATA_KEY, json!(true));
        let matches = self.store.query(&probe, Some(&filter), 10_000).await?;

        let entries: Vec<EmbeddedFile> = matches
            .iter()
            .filter_map(|m| embedded_file_from_metadata(&m.metadata))
            .collect();
        let restored = entries.len();

        self.status.restore_history(entries);
        if restored > 0 {
            info!(files = restored, "embedded-files history restored from store");
        }
        Ok(restored)
    }
}

fn chunk_metadata(chunk: &Chunk, spec_id: &str, file_name: &str) -> Value {
    let mut object = serde_json::Map::new();
    object.insert("text".to_string(), json!(chunk.text));
    object.insert("kind".to_string(), json!(chunk.kind.as_str()));
    object.insert("spec_id".to_string(), json!(spec_id));
    object.insert("file_name".to_string(), json!(file_name));

    if let Some(endpoint) = &chunk.metadata.endpoint {
        object.insert("endpoint".to_string(), json!(endpoint));
    }
    if let Some(method) = &chunk.metadata.method {
        object.insert("method".to_string(), json!(method));
    }
    if !chunk.metadata.tags.is_empty() {
        object.insert("tags".to_string(), json!(chunk.metadata.tags));
    }
    if !chunk.metadata.schema_refs.is_empty() {
        object.insert("schema_refs".to_string(), json!(chunk.metadata.schema_refs));
    }

    Value::Object(object)
}

fn file_metadata_record(
    spec_id: &str,
    file_name: &str,
    total_chunks: usize,
    embedded_at: DateTime<Utc>,
    dimension: usize,
) -> VectorRecord {
    VectorRecord {
        id: format!("{FILE_METADATA_ID_PREFIX}-{spec_id}"),
        values: vec![PLACEHOLDER_MAGNITUDE; dimension],
        metadata: json!({
            FILE_METADATA_KEY: true,
            "spec_id": spec_id,
            "file_name": file_name,
            "total_chunks": total_chunks,
            "embedded_at": embedded_at.to_rfc3339(),
        }),
    }
}

fn embedded_file_from_metadata(metadata: &Value) -> Option<EmbeddedFile> {
    let embedded_at = metadata
        .get("embedded_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))?;

    Some(EmbeddedFile {
        spec_id: metadata.get("spec_id")?.as_str()?.to_string(),
        file_name: metadata.get("file_name")?.as_str()?.to_string(),
        total_chunks: metadata.get("total_chunks")?.as_u64()? as usize,
        embedded_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use crate::store::{MemoryStore, content_filter};

    const MINIMAL_SPEC: &str = r#"{
        "openapi": "3.0.0",
        "info": {"title": "Widgets", "version": "1.0.0"},
        "paths": {
            "/widgets": {
                "get": {"summary": "List widgets"},
                "post": {"summary": "Create a widget"}
            }
        }
    }"#;

    fn service() -> IngestService {
        let embedder = Arc::new(HashedEmbedder::new(64));
        let store = Arc::new(MemoryStore::new(embedder.dimension()));
        IngestService::new(store, embedder).with_batch_size(2)
    }

    #[tokio::test]
    async fn test_ingest_structured_document() {
        let service = service();
        let doc = SpecDocument::new(MINIMAL_SPEC.to_string(), SpecFormat::Structured);

        let outcome = service.ingest(&doc, "widgets.json").await.unwrap();
        let IngestOutcome::Completed { chunk_count, row_errors } = outcome else {
            panic!("expected completion");
        };

        // 1 info chunk + 2 operation chunks.
        assert_eq!(chunk_count, 3);
        assert!(row_errors.is_empty());

        // Store holds the chunks plus one bookkeeping record.
        assert_eq!(service.store.count().await.unwrap(), 4);

        let snapshot = service.status().snapshot();
        assert_eq!(snapshot.state, JobState::Completed);
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.embedded_files.len(), 1);
        assert_eq!(snapshot.embedded_files[0].total_chunks, 3);
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let service = service();
        let doc = SpecDocument::new(MINIMAL_SPEC.to_string(), SpecFormat::Structured);

        service.ingest(&doc, "widgets.json").await.unwrap();
        let count_after_first = service.store.count().await.unwrap();

        service.ingest(&doc, "widgets.json").await.unwrap();
        assert_eq!(service.store.count().await.unwrap(), count_after_first);
        // History de-duplicates by spec identity.
        assert_eq!(service.status().snapshot().embedded_files.len(), 1);
    }

    #[tokio::test]
    async fn test_bookkeeping_record_excluded_from_content_queries() {
        let service = service();
        let doc = SpecDocument::new(MINIMAL_SPEC.to_string(), SpecFormat::Structured);
        service.ingest(&doc, "widgets.json").await.unwrap();

        let query = service.embedder.embed_query("widgets").await.unwrap();
        let filter = content_filter();
        let matches = service.store.query(&query, Some(&filter), 10).await.unwrap();

        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|m| m.metadata.get(FILE_METADATA_KEY).is_none()));
    }

    #[tokio::test]
    async fn test_invalid_json_fails_job() {
        let service = service();
        let doc = SpecDocument::new("not json".to_string(), SpecFormat::Structured);

        let result = service.ingest(&doc, "broken.json").await;
        assert!(matches!(result, Err(IngestError::Spec(_))));

        let snapshot = service.status().snapshot();
        assert_eq!(snapshot.state, JobState::Failed);
        assert!(snapshot.error.is_some());
        assert!(!snapshot.is_processing);
    }

    #[tokio::test]
    async fn test_tabular_row_errors_surface() {
        let service = service();
        let content = "ENDPOINT,METHOD,SUMMARY\n/widgets,GET,List\n/broken,,No method\n";
        let doc = SpecDocument::new(content.to_string(), SpecFormat::Tabular);

        let outcome = service.ingest(&doc, "widgets.csv").await.unwrap();
        let IngestOutcome::Completed { chunk_count, row_errors } = outcome else {
            panic!("expected completion");
        };

        assert_eq!(chunk_count, 1);
        assert_eq!(row_errors.len(), 1);
        assert_eq!(row_errors[0].line_number, 3);
        // Row-level failures do not fail the job.
        assert_eq!(service.status().snapshot().state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_heal_history_rebuilds_from_store() {
        let embedder: Arc<HashedEmbedder> = Arc::new(HashedEmbedder::new(64));
        let store = Arc::new(MemoryStore::new(embedder.dimension()));

        {
            let service = IngestService::new(store.clone(), embedder.clone());
            let doc = SpecDocument::new(MINIMAL_SPEC.to_string(), SpecFormat::Structured);
            service.ingest(&doc, "widgets.json").await.unwrap();
        }

        // Fresh service over the same store: history starts empty.
        let service = IngestService::new(store, embedder);
        assert!(service.status().snapshot().embedded_files.is_empty());

        let restored = service.heal_history().await.unwrap();
        assert_eq!(restored, 1);

        let snapshot = service.status().snapshot();
        assert_eq!(snapshot.embedded_files[0].file_name, "widgets.json");
        assert_eq!(snapshot.embedded_files[0].total_chunks, 3);
    }
}

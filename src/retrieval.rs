//! Retrieval service.
//!
//! Embeds a natural-language query and runs it against the vector store.
//! Bookkeeping records are always excluded here, at the call site, so the
//! store itself stays policy-free. An embedding failure is fatal for the
//! query; a store failure degrades to an empty result.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::{EmbedResult, Embedder};
use crate::store::{Filter, Match, VectorStore, content_filter};

/// One retrieved chunk with its similarity score.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
    pub metadata: Value,
}

/// Query-side half of the pipeline.
pub struct RetrievalService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    min_score: Option<f32>,
}

impl RetrievalService {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            top_k: config.top_k.max(1),
            min_score: config.min_score,
        }
    }

    /// Retrieve the chunks most similar to `query`.
    ///
    /// An optional caller filter is combined with the always-on exclusion of
    /// bookkeeping records.
    pub async fn retrieve(
        &self,
        query: &str,
        filter: Option<&Filter>,
    ) -> EmbedResult<Vec<RetrievedChunk>> {
        let vector = self.embedder.embed_query(query).await?;

        let combined = match filter {
            Some(extra) => Filter::and(vec![content_filter(), extra.clone()]),
            None => content_filter(),
        };

        let matches = match self.store.query(&vector, Some(&combined), self.top_k).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!("store query failed, returning no results: {e}");
                return Ok(Vec::new());
            }
        };

        debug!(query, matches = matches.len(), "retrieval query");

        Ok(matches
            .into_iter()
            .filter(|m| self.min_score.is_none_or(|threshold| m.score >= threshold))
            .map(retrieved_chunk)
            .collect())
    }
}

fn retrieved_chunk(m: Match) -> RetrievedChunk {
    let text = m
        .metadata
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    RetrievedChunk {
        text,
        score: m.score,
        metadata: m.metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use crate::ingest::IngestService;
    use crate::spec::{SpecDocument, SpecFormat};
    use crate::store::{MemoryStore, StoreError, StoreResult, VectorRecord};
    use async_trait::async_trait;
    use serde_json::json;

    const WIDGET_SPEC: &str = r#"{
        "openapi": "3.0.0",
        "info": {"title": "Widget API", "version": "1.0.0"},
        "paths": {
            "/widgets": {
                "get": {"summary": "List all widgets"},
                "post": {"summary": "Create a widget", "description": "Create a new widget"}
            },
            "/orders": {
                "get": {"summary": "List all orders"}
            }
        }
    }"#;

    async fn populated() -> (Arc<MemoryStore>, Arc<HashedEmbedder>) {
        let embedder = Arc::new(HashedEmbedder::new(128));
        let store = Arc::new(MemoryStore::new(embedder.dimension()));
        let ingest = IngestService::new(store.clone(), embedder.clone());
        let doc = SpecDocument::new(WIDGET_SPEC.to_string(), SpecFormat::Structured);
        ingest.ingest(&doc, "widgets.json").await.unwrap();
        (store, embedder)
    }

    #[tokio::test]
    async fn test_query_ranks_matching_operation_first() {
        let (store, embedder) = populated().await;
        let service = RetrievalService::new(store, embedder, &RetrievalConfig::default());

        let results = service.retrieve("create a widget", None).await.unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].metadata["method"], "POST");
        assert_eq!(results[0].metadata["endpoint"], "/widgets");
        assert!(results[0].text.contains("Create a widget"));
    }

    #[tokio::test]
    async fn test_bookkeeping_records_never_surface() {
        let (store, embedder) = populated().await;
        let service = RetrievalService::new(store, embedder, &RetrievalConfig::default());

        // Even a query phrased like the bookkeeping metadata stays clean.
        let results = service.retrieve("widgets json file", None).await.unwrap();
        assert!(
            results
                .iter()
                .all(|r| r.metadata.get("is_file_metadata").is_none())
        );
    }

    #[tokio::test]
    async fn test_caller_filter_is_combined() {
        let (store, embedder) = populated().await;
        let service = RetrievalService::new(store, embedder, &RetrievalConfig::default());

        let filter = Filter::eq("endpoint", json!("/orders"));
        let results = service.retrieve("list", Some(&filter)).await.unwrap();

        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.metadata["endpoint"] == "/orders"));
    }

    #[tokio::test]
    async fn test_min_score_threshold_drops_weak_matches() {
        let (store, embedder) = populated().await;
        let config = RetrievalConfig {
            top_k: 10,
            min_score: Some(0.99),
        };
        let service = RetrievalService::new(store, embedder, &config);

        // Nothing scores near 1.0 against an unrelated query.
        let results = service.retrieve("zebra migration patterns", None).await.unwrap();
        assert!(results.is_empty());
    }

    /// Store whose queries always fail.
    struct BrokenStore;

    #[async_trait]
    impl VectorStore for BrokenStore {
        fn dimension(&self) -> usize {
            128
        }

        async fn upsert(&self, _records: Vec<VectorRecord>) -> StoreResult<()> {
            Ok(())
        }

        async fn query(
            &self,
            _vector: &[f32],
            _filter: Option<&Filter>,
            _top_k: usize,
        ) -> StoreResult<Vec<Match>> {
            Err(StoreError::Persist("backend down".to_string()))
        }

        async fn count(&self) -> StoreResult<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_empty() {
        let embedder = Arc::new(HashedEmbedder::new(128));
        let service =
            RetrievalService::new(Arc::new(BrokenStore), embedder, &RetrievalConfig::default());

        let results = service.retrieve("anything", None).await.unwrap();
        assert!(results.is_empty());
    }
}

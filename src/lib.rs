pub mod chunk;
pub mod config;
pub mod embedding;
pub mod ingest;
pub mod logging;
pub mod retrieval;
pub mod spec;
pub mod store;
pub mod tabular;

pub use chunk::{Chunk, ChunkKind, ChunkMetadata};
pub use config::Settings;
pub use embedding::{EmbedError, Embedder, HashedEmbedder, OpenAiEmbedder};
pub use ingest::{IngestError, IngestOutcome, IngestService, ProcessingStatus, StatusHandle};
pub use retrieval::{RetrievalService, RetrievedChunk};
pub use spec::{SpecDocument, SpecFormat};
pub use store::{Filter, Match, VectorRecord, VectorStore};

//! Core chunk types shared by both ingestion paths.
//!
//! A [`Chunk`] is the atomic unit of the pipeline: extracted text plus
//! structured metadata, with a deterministic id so that re-ingesting the
//! same document overwrites instead of duplicating.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What part of a specification a chunk was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Document title/version/description block.
    Info,
    /// One (path, method) operation from a structured document.
    Path,
    /// A named component entry (security scheme, parameter, response, ...).
    Component,
    /// A named schema definition.
    Schema,
    /// One validated row from a tabular export.
    Endpoint,
}

impl ChunkKind {
    /// Stable lowercase name, used in stored metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Path => "path",
            Self::Component => "component",
            Self::Schema => "schema",
            Self::Endpoint => "endpoint",
        }
    }
}

/// Structured metadata carried alongside chunk text.
///
/// Duplicated into the vector store so queries can filter without
/// re-reading the source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Endpoint path (e.g. `/widgets/{id}`), when the chunk describes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Uppercase HTTP method, when the chunk describes an operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Operation tags from the source document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Names of schemas reached while resolving `$ref` pointers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_refs: Vec<String>,
}

/// A unit of extracted text with metadata, the object that gets embedded.
///
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic identifier (see [`Chunk::endpoint_id`] and
    /// [`Chunk::positional_id`]).
    pub id: String,

    /// Source category of this chunk.
    pub kind: ChunkKind,

    /// The text that gets embedded.
    pub text: String,

    /// Structured metadata for filtering.
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(id: String, kind: ChunkKind, text: String, metadata: ChunkMetadata) -> Self {
        Self {
            id,
            kind,
            text,
            metadata,
        }
    }

    /// Deterministic id for endpoint-bearing chunks: `slug(endpoint)-method`.
    ///
    /// Stable across re-ingestion, so upserting the same operation twice
    /// overwrites the prior vector.
    pub fn endpoint_id(endpoint: &str, method: &str) -> String {
        format!("{}-{}", slug(endpoint), method.to_lowercase())
    }

    /// Deterministic id for chunks without an endpoint: `{spec_id}-{position}`.
    pub fn positional_id(spec_id: &str, position: usize) -> String {
        format!("{spec_id}-{position}")
    }
}

/// Lowercase a path or name into an id-safe slug.
///
/// Runs of non-alphanumeric characters collapse into a single `-`;
/// `/widgets/{id}` becomes `widgets-id`.
pub fn slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    out
}

/// Content-derived spec identity: first 12 hex chars of SHA-256.
///
/// Two uploads of the same bytes share an identity; same filename with
/// different content does not.
pub fn spec_id(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..12].to_string()
}

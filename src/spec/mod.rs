//! Specification documents and the structured-document chunker.

pub mod chunker;

pub use chunker::chunk_document;

use serde_json::Value;
use thiserror::Error;

use crate::chunk::spec_id;

/// Errors from loading a specification document.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("malformed structured document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("document root must be a JSON object")]
    NotAnObject,
}

/// Result type for spec operations.
pub type SpecResult<T> = Result<T, SpecError>;

/// Input format of an uploaded specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecFormat {
    /// OpenAPI-style JSON tree.
    Structured,
    /// Delimited export with a header row.
    Tabular,
}

/// An uploaded specification document.
///
/// Created on upload, consumed once by ingestion, immutable thereafter.
#[derive(Debug, Clone)]
pub struct SpecDocument {
    /// Content-derived identity (stable across uploads of the same bytes).
    pub spec_id: String,

    /// Input format tag.
    pub format: SpecFormat,

    /// Raw document content.
    pub content: String,
}

impl SpecDocument {
    /// Wrap raw content with a generated spec identity.
    pub fn new(content: String, format: SpecFormat) -> Self {
        Self {
            spec_id: spec_id(&content),
            format,
            content,
        }
    }

    /// Parse the raw content as a JSON tree.
    ///
    /// Only meaningful for [`SpecFormat::Structured`] documents.
    pub fn parse_tree(&self) -> SpecResult<Value> {
        let value: Value = serde_json::from_str(&self.content)?;
        if !value.is_object() {
            return Err(SpecError::NotAnObject);
        }
        Ok(value)
    }
}

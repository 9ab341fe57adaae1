//! Result and error types for the retrieval pipeline.

use crate::qdrant::{FilterValue, VectorStoreError};
use serde::Serialize;
use thiserror::Error;

/// Errors emitted while indexing a document.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The document produced no chunks.
    #[error("Document {0} contains no indexable text")]
    EmptyDocument(FilterValue),
    /// Vector store rejected a write.
    #[error("Vector store request failed: {0}")]
    VectorStore(#[from] VectorStoreError),
}

/// Summary of a completed indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexOutcome {
    /// Document that was (re)indexed.
    pub document_id: String,
    /// Chunks stored for the document.
    pub chunk_count: usize,
    /// Whether the stored vectors are zero-vector placeholders.
    pub degraded: bool,
}

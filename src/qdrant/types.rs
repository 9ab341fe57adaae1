//! Shared types used by the vector store gateway and helpers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Host/port did not form a valid base URL.
    #[error("Invalid vector store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The requested collection does not exist.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// A filter expression could not be parsed.
    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),
    /// Chunks and vectors passed to an upsert differ in length.
    #[error("Got {chunks} chunks but {vectors} vectors")]
    LengthMismatch {
        /// Number of chunks supplied.
        chunks: usize,
        /// Number of vectors supplied.
        vectors: usize,
    },
}

/// Connection parameters for the vector store gateway.
#[derive(Debug, Clone)]
pub struct VectorStoreSettings {
    /// Qdrant host name or address.
    pub host: String,
    /// Qdrant REST port.
    pub port: u16,
    /// Collection holding document chunks.
    pub collection: String,
    /// Alias registered while a connection is open.
    pub alias: String,
    /// Optional API key sent as the `api-key` header.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Stored chunk returned by filtered queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkRecord {
    /// Identifier of the owning document.
    pub id: String,
    /// Position of the chunk within the document.
    pub chunk_index: usize,
    /// Chunk text.
    pub content: String,
}

/// Stored chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    /// Identifier of the owning document.
    pub id: String,
    /// Position of the chunk within the document.
    pub chunk_index: usize,
    /// Chunk text.
    pub content: String,
    /// Similarity score computed by Qdrant.
    pub score: f32,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfoResponse {
    pub(crate) result: CollectionInfo,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfo {
    #[serde(default)]
    pub(crate) status: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResponse {
    pub(crate) result: ScrollResult,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResult {
    #[serde(default)]
    pub(crate) points: Vec<ScrollPoint>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollPoint {
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

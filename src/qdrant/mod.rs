//! Qdrant vector store integration.

pub mod client;
pub mod connection;
pub mod filters;
pub mod payload;
pub mod types;

pub use client::{Connection, LoadedCollection, VectorStoreGateway};
pub use connection::{AliasGuard, ConnectionRegistry};
pub use filters::{DOCUMENT_ID_FIELD, FilterExpr, FilterValue};
pub use payload::{chunk_point_id, compute_chunk_hash};
pub use types::{ChunkRecord, ScoredChunk, VectorStoreError, VectorStoreSettings};

//! Retrieval pipeline: chunking, embedding, and vector store orchestration.

pub mod chunking;
mod service;
pub mod types;

pub use chunking::{Chunk, ChunkingSettings, split_text};
pub use service::RetrievalService;
pub use types::{IndexError, IndexOutcome};

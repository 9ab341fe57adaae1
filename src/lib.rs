#![deny(missing_docs)]

//! Core library for campuslink document retrieval and verification codes.

pub(crate) mod clock;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Retrieval pipeline metrics.
pub mod metrics;
/// Document chunking and retrieval orchestration.
pub mod processing;
/// Qdrant vector store gateway.
pub mod qdrant;
/// One-time verification codes.
pub mod verification;

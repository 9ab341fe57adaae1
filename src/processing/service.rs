//! Retrieval service coordinating chunking, embedding, and vector store operations.

use crate::{
    embedding::EmbeddingClient,
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::ChunkingSettings,
        types::{IndexError, IndexOutcome},
    },
    qdrant::{ChunkRecord, FilterExpr, FilterValue, ScoredChunk, VectorStoreGateway},
};
use std::sync::Arc;

/// Coordinates the document pipeline: chunk, embed, and store; then filtered reads and search.
///
/// Reads are fail-open: an unreachable embedding endpoint or vector store yields empty results
/// rather than errors. Writes surface vector store failures to the caller.
pub struct RetrievalService {
    embedding: Arc<dyn EmbeddingClient>,
    gateway: VectorStoreGateway,
    chunking: ChunkingSettings,
    metrics: Arc<PipelineMetrics>,
}

impl RetrievalService {
    /// Assemble a service from its collaborators.
    pub fn new(
        embedding: Arc<dyn EmbeddingClient>,
        gateway: VectorStoreGateway,
        chunking: ChunkingSettings,
    ) -> Self {
        Self {
            embedding,
            gateway,
            chunking,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Vector store gateway used by this service.
    pub fn gateway(&self) -> &VectorStoreGateway {
        &self.gateway
    }

    /// Chunk, embed, and store a document, replacing any chunks previously stored for it.
    ///
    /// A degraded embedding batch is still stored so the document's chunks remain reachable
    /// through filtered queries; the outcome reports the degradation.
    pub async fn index_document(
        &self,
        document_id: &FilterValue,
        text: &str,
    ) -> Result<IndexOutcome, IndexError> {
        let chunks = self.chunking.split(text);
        if chunks.is_empty() {
            return Err(IndexError::EmptyDocument(document_id.clone()));
        }
        tracing::info!(
            document = %document_id,
            chunks = chunks.len(),
            max_chars = self.chunking.max_chars,
            overlap = self.chunking.overlap,
            "Indexing document"
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let batch = self.embedding.embed(texts).await;
        let degraded = batch.is_degraded();
        if degraded {
            self.metrics.record_degraded_batch();
        }

        self.gateway
            .ensure_collection(self.embedding.dimension(), document_id.field_schema())
            .await?;
        self.gateway
            .delete_matching(&FilterExpr::id_equals(document_id.clone()))
            .await?;
        let chunk_count = self
            .gateway
            .upsert_chunks(document_id, &chunks, batch.into_vectors())
            .await?;

        self.metrics.record_document(chunk_count as u64);
        tracing::info!(
            document = %document_id,
            chunks = chunk_count,
            degraded,
            "Document indexed"
        );

        Ok(IndexOutcome {
            document_id: document_id.to_string(),
            chunk_count,
            degraded,
        })
    }

    /// Stored chunks of one document in chunk order, at most `top_k`.
    pub async fn document_chunks(
        &self,
        document_id: &FilterValue,
        top_k: usize,
    ) -> Vec<ChunkRecord> {
        self.gateway
            .query(&FilterExpr::id_equals(document_id.clone()), top_k)
            .await
    }

    /// Similarity search for `query`, optionally restricted to one document.
    ///
    /// Returns no hits when the query cannot be embedded; zero vectors carry no similarity signal.
    pub async fn search(
        &self,
        query: &str,
        document_id: Option<&FilterValue>,
        top_k: usize,
    ) -> Vec<ScoredChunk> {
        let batch = self.embedding.embed(vec![query.to_string()]).await;
        if batch.is_degraded() {
            self.metrics.record_degraded_batch();
            tracing::warn!("Query embedding degraded; returning no hits");
            return Vec::new();
        }
        let Some(vector) = batch.into_vectors().pop() else {
            return Vec::new();
        };

        let filter = document_id.map(|id| FilterExpr::id_equals(id.clone()));
        let hits = self.gateway.search(vector, filter.as_ref(), top_k).await;
        tracing::debug!(hits = hits.len(), top_k, "Search completed");
        hits
    }

    /// Current pipeline counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

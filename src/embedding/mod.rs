//! Embedding client abstraction and the HTTP adapter.
//!
//! [`EmbeddingClient::generate_embeddings`] is the raw, fallible call. Pipelines use
//! [`EmbeddingClient::embed`], which never fails: a broken endpoint or a malformed response
//! yields [`EmbeddingBatch::Degraded`] holding one zero vector per input, so searches degrade
//! to no-match instead of erroring.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// HTTP layer failed before a usable response arrived (includes timeouts).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Endpoint answered with a non-success status.
    #[error("Embedding endpoint returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the endpoint.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Endpoint returned a different number of vectors than texts sent.
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch {
        /// Number of input texts.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// A returned vector does not match the configured dimension.
    #[error("Embedding {index} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        /// Position of the offending vector.
        index: usize,
        /// Configured dimension.
        expected: usize,
        /// Dimension actually returned.
        actual: usize,
    },
}

/// Connection and shape parameters for the embedding endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Endpoint receiving `{ model, input }` requests.
    pub url: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Expected length of every returned vector.
    pub dimension: usize,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Result of a fail-open embedding call.
#[derive(Debug)]
pub enum EmbeddingBatch {
    /// The endpoint produced valid vectors.
    Generated(Vec<Vec<f32>>),
    /// The call failed; `vectors` holds one zero vector per input.
    Degraded {
        /// Zero vectors of the configured dimension.
        vectors: Vec<Vec<f32>>,
        /// Failure that triggered the fallback.
        error: EmbeddingClientError,
    },
}

impl EmbeddingBatch {
    /// Vectors in input order, real or substituted.
    pub fn vectors(&self) -> &[Vec<f32>] {
        match self {
            Self::Generated(vectors) | Self::Degraded { vectors, .. } => vectors,
        }
    }

    /// Consume the batch, returning its vectors.
    pub fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            Self::Generated(vectors) | Self::Degraded { vectors, .. } => vectors,
        }
    }

    /// Whether the batch fell back to zero vectors.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Dimension of the vectors this client produces.
    fn dimension(&self) -> usize;

    /// Produce an embedding vector for each supplied text, in order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Embed `texts`, substituting zero vectors when the provider fails.
    async fn embed(&self, texts: Vec<String>) -> EmbeddingBatch {
        if texts.is_empty() {
            return EmbeddingBatch::Generated(Vec::new());
        }

        let count = texts.len();
        match self.generate_embeddings(texts).await {
            Ok(vectors) => EmbeddingBatch::Generated(vectors),
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    count,
                    dimension = self.dimension(),
                    "Embedding request failed; substituting zero vectors"
                );
                EmbeddingBatch::Degraded {
                    vectors: zero_vectors(count, self.dimension()),
                    error,
                }
            }
        }
    }
}

/// `count` zero vectors of length `dimension`.
pub fn zero_vectors(count: usize, dimension: usize) -> Vec<Vec<f32>> {
    vec![vec![0.0_f32; dimension]; count]
}

/// Check that a response holds one vector per text, each of the configured dimension.
pub fn validate_shape(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<(), EmbeddingClientError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingClientError::CountMismatch {
            expected: expected_count,
            actual: vectors.len(),
        });
    }
    if let Some((index, vector)) = vectors
        .iter()
        .enumerate()
        .find(|(_, vector)| vector.len() != dimension)
    {
        return Err(EmbeddingClientError::DimensionMismatch {
            index,
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding client issuing one batched JSON request per call.
pub struct HttpEmbeddingClient {
    http: Client,
    settings: EmbeddingSettings,
}

impl HttpEmbeddingClient {
    /// Build a client with the configured timeout.
    pub fn new(settings: EmbeddingSettings) -> Result<Self, EmbeddingClientError> {
        let http = Client::builder()
            .user_agent("campuslink/0.1")
            .timeout(settings.timeout)
            .build()?;
        tracing::debug!(
            url = %settings.url,
            model = %settings.model,
            dimension = settings.dimension,
            timeout_secs = settings.timeout.as_secs(),
            "Initialized embedding client"
        );
        Ok(Self { http, settings })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    fn dimension(&self) -> usize {
        self.settings.dimension
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = texts.len();
        tracing::debug!(
            model = %self.settings.model,
            count = expected,
            "Generating embeddings"
        );

        let mut request = self.http.post(&self.settings.url).json(&EmbedRequest {
            model: &self.settings.model,
            input: &texts,
        });
        if let Some(api_key) = &self.settings.api_key
            && !api_key.is_empty()
        {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::UnexpectedStatus { status, body });
        }

        let EmbedResponse { embeddings } = response.json().await?;
        validate_shape(&embeddings, expected, self.settings.dimension)?;
        Ok(embeddings)
    }
}

//! Vector store gateway over the Qdrant REST API.
//!
//! Every operation walks the same lifecycle: [`VectorStoreGateway::connect`] checks the server
//! and registers the configured alias, [`Connection::load_collection`] verifies the collection,
//! the work runs against the [`LoadedCollection`], and dropping the [`Connection`] releases the
//! alias whether the work succeeded or not.

use crate::processing::Chunk;
use crate::qdrant::{
    connection::{AliasGuard, ConnectionRegistry},
    filters::{DOCUMENT_ID_FIELD, FilterExpr, FilterValue},
    payload::{CHUNK_PAYLOAD_FIELDS, build_chunk_payload, chunk_point_id, map_chunk_payload},
    types::{
        ChunkRecord, CollectionInfoResponse, QueryResponse, QueryResponseResult, ScoredChunk,
        ScrollResponse, VectorStoreError, VectorStoreSettings,
    },
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;

/// Gateway owning the HTTP client, settings and alias registry.
pub struct VectorStoreGateway {
    client: Client,
    settings: VectorStoreSettings,
    registry: Arc<ConnectionRegistry>,
}

impl VectorStoreGateway {
    /// Construct a gateway with its own alias registry.
    pub fn new(settings: VectorStoreSettings) -> Result<Self, VectorStoreError> {
        Self::with_registry(settings, Arc::new(ConnectionRegistry::new()))
    }

    /// Construct a gateway sharing an existing alias registry.
    pub fn with_registry(
        settings: VectorStoreSettings,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<Self, VectorStoreError> {
        let client = Client::builder()
            .user_agent("campuslink/0.1")
            .timeout(settings.timeout)
            .build()?;
        tracing::debug!(
            host = %settings.host,
            port = settings.port,
            collection = %settings.collection,
            alias = %settings.alias,
            has_api_key = settings
                .api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized vector store gateway"
        );
        Ok(Self {
            client,
            settings,
            registry,
        })
    }

    /// Alias registry tracking open connections.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Collection this gateway operates on.
    pub fn collection(&self) -> &str {
        &self.settings.collection
    }

    /// Connect using the configured alias, host and port.
    pub async fn connect(&self) -> Result<Connection<'_>, VectorStoreError> {
        self.connect_as(&self.settings.alias, &self.settings.host, self.settings.port)
            .await
    }

    /// Probe `host:port` and register the connection under `alias`.
    pub async fn connect_as(
        &self,
        alias: &str,
        host: &str,
        port: u16,
    ) -> Result<Connection<'_>, VectorStoreError> {
        let base_url = normalize_base_url(&format!("http://{host}:{port}"))
            .map_err(VectorStoreError::InvalidUrl)?;
        let health = self.request(&base_url, Method::GET, "").send().await?;
        ensure_success(health).await?;

        let guard = self.registry.register(alias, &base_url);
        tracing::debug!(alias, endpoint = %base_url, "Connected to vector store");
        Ok(Connection {
            gateway: self,
            base_url,
            guard,
        })
    }

    /// Fetch chunks matching `filter`, returning no results on any failure.
    pub async fn query(&self, filter: &FilterExpr, top_k: usize) -> Vec<ChunkRecord> {
        match self.try_query(filter, top_k).await {
            Ok(records) => records,
            Err(error) => {
                tracing::warn!(
                    collection = %self.settings.collection,
                    filter = %filter,
                    error = %error,
                    "Vector store query failed; returning no results"
                );
                Vec::new()
            }
        }
    }

    /// Fetch at most `top_k` chunks matching `filter`, ordered by chunk index.
    pub async fn try_query(
        &self,
        filter: &FilterExpr,
        top_k: usize,
    ) -> Result<Vec<ChunkRecord>, VectorStoreError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let connection = self.connect().await?;
        let collection = connection
            .load_collection(&self.settings.collection)
            .await?;
        collection.query(filter, top_k).await
    }

    /// Similarity search returning no results on any failure.
    pub async fn search(
        &self,
        vector: Vec<f32>,
        filter: Option<&FilterExpr>,
        top_k: usize,
    ) -> Vec<ScoredChunk> {
        match self.try_search(vector, filter, top_k).await {
            Ok(hits) => hits,
            Err(error) => {
                tracing::warn!(
                    collection = %self.settings.collection,
                    error = %error,
                    "Vector store search failed; returning no results"
                );
                Vec::new()
            }
        }
    }

    /// Similarity search over the collection, best match first.
    pub async fn try_search(
        &self,
        vector: Vec<f32>,
        filter: Option<&FilterExpr>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let connection = self.connect().await?;
        let collection = connection
            .load_collection(&self.settings.collection)
            .await?;
        collection.search(vector, filter, top_k).await
    }

    /// Create the collection when missing and ensure payload indexes for document lookups.
    pub async fn ensure_collection(
        &self,
        dimension: usize,
        id_schema: &str,
    ) -> Result<(), VectorStoreError> {
        let connection = self.connect().await?;
        connection
            .create_collection_if_missing(&self.settings.collection, dimension)
            .await?;
        let collection = connection
            .load_collection(&self.settings.collection)
            .await?;
        collection
            .ensure_payload_indexes(&[(DOCUMENT_ID_FIELD, id_schema), ("chunk_index", "integer")])
            .await
    }

    /// Store chunk vectors for `document_id`, overwriting chunks with the same index.
    pub async fn upsert_chunks(
        &self,
        document_id: &FilterValue,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize, VectorStoreError> {
        if chunks.len() != vectors.len() {
            return Err(VectorStoreError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        if chunks.is_empty() {
            return Ok(0);
        }
        let connection = self.connect().await?;
        let collection = connection
            .load_collection(&self.settings.collection)
            .await?;
        collection.upsert(document_id, chunks, vectors).await
    }

    /// Delete every point matching `filter`.
    pub async fn delete_matching(&self, filter: &FilterExpr) -> Result<(), VectorStoreError> {
        let connection = self.connect().await?;
        let collection = connection
            .load_collection(&self.settings.collection)
            .await?;
        collection.delete(filter).await
    }

    fn request(&self, base_url: &str, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.settings.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }
}

/// Open connection holding a registered alias.
pub struct Connection<'g> {
    gateway: &'g VectorStoreGateway,
    base_url: String,
    guard: AliasGuard,
}

impl Connection<'_> {
    /// Alias this connection is registered under.
    pub fn alias(&self) -> &str {
        self.guard.alias()
    }

    /// Normalized REST endpoint of the connected server.
    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    /// Verify that `name` exists and can serve requests.
    pub async fn load_collection(
        &self,
        name: &str,
    ) -> Result<LoadedCollection<'_>, VectorStoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(VectorStoreError::CollectionNotFound(name.to_string())),
            status if status.is_success() => {
                let info: CollectionInfoResponse = response.json().await?;
                let state = info.result.status.unwrap_or_default();
                if state == "red" {
                    tracing::warn!(collection = name, "Collection loaded in red state");
                } else {
                    tracing::trace!(collection = name, state = %state, "Collection loaded");
                }
                Ok(LoadedCollection {
                    connection: self,
                    name: name.to_string(),
                })
            }
            _ => Err(ensure_success(response).await.err().unwrap_or_else(|| {
                VectorStoreError::CollectionNotFound(name.to_string())
            })),
        }
    }

    /// Create `name` with cosine distance unless it already exists.
    pub async fn create_collection_if_missing(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<(), VectorStoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{name}"))
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => return Ok(()),
            StatusCode::NOT_FOUND => {}
            _ => return ensure_success(response).await,
        }

        tracing::debug!(collection = name, dimension, "Creating collection");
        let body = json!({
            "vectors": {
                "size": dimension,
                "distance": "Cosine"
            }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{name}"))
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::info!(collection = name, dimension, "Collection created");
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.gateway.request(&self.base_url, method, path)
    }
}

/// Collection verified by [`Connection::load_collection`].
pub struct LoadedCollection<'c> {
    connection: &'c Connection<'c>,
    name: String,
}

impl LoadedCollection<'_> {
    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scroll chunks matching `filter`, ordered by chunk index.
    pub async fn query(
        &self,
        filter: &FilterExpr,
        top_k: usize,
    ) -> Result<Vec<ChunkRecord>, VectorStoreError> {
        let body = json!({
            "filter": filter.to_qdrant(),
            "limit": top_k,
            "order_by": { "key": "chunk_index", "direction": "asc" },
            "with_payload": CHUNK_PAYLOAD_FIELDS,
            "with_vector": false,
        });
        let response = self
            .request(Method::POST, "points/scroll")
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ensure_success(response).await.err().unwrap_or_else(|| {
                VectorStoreError::CollectionNotFound(self.name.clone())
            }));
        }

        let ScrollResponse { result } = response.json().await?;
        let mut records: Vec<ChunkRecord> = result
            .points
            .into_iter()
            .filter_map(|point| point.payload)
            .filter_map(|payload| {
                let record = map_chunk_payload(&payload);
                if record.is_none() {
                    tracing::debug!(collection = %self.name, "Skipping point with incomplete payload");
                }
                record
            })
            .collect();
        records.sort_by_key(|record| record.chunk_index);
        records.truncate(top_k);

        tracing::debug!(
            collection = %self.name,
            filter = %filter,
            results = records.len(),
            "Vector store query completed"
        );
        Ok(records)
    }

    /// Cosine similarity search, best match first.
    pub async fn search(
        &self,
        vector: Vec<f32>,
        filter: Option<&FilterExpr>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        let mut body = json!({
            "query": vector,
            "limit": top_k,
            "with_payload": CHUNK_PAYLOAD_FIELDS,
        });
        if let (Some(filter), Some(obj)) = (filter, body.as_object_mut()) {
            obj.insert("filter".into(), filter.to_qdrant());
        }

        let response = self
            .request(Method::POST, "points/query")
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ensure_success(response).await.err().unwrap_or_else(|| {
                VectorStoreError::CollectionNotFound(self.name.clone())
            }));
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        let hits = points
            .into_iter()
            .filter_map(|point| {
                let record = map_chunk_payload(point.payload.as_ref()?)?;
                Some(ScoredChunk {
                    id: record.id,
                    chunk_index: record.chunk_index,
                    content: record.content,
                    score: point.score,
                })
            })
            .collect();
        Ok(hits)
    }

    /// Upsert one point per chunk with deterministic identifiers.
    pub async fn upsert(
        &self,
        document_id: &FilterValue,
        chunks: &[Chunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize, VectorStoreError> {
        let points: Vec<Value> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                json!({
                    "id": chunk_point_id(document_id, chunk.index),
                    "vector": vector,
                    "payload": build_chunk_payload(document_id, chunk),
                })
            })
            .collect();

        let point_count = points.len();
        let response = self
            .request(Method::PUT, "points")
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(
            collection = %self.name,
            document = %document_id,
            points = point_count,
            "Points upserted"
        );
        Ok(point_count)
    }

    /// Delete every point matching `filter`.
    pub async fn delete(&self, filter: &FilterExpr) -> Result<(), VectorStoreError> {
        let response = self
            .request(Method::POST, "points/delete")
            .query(&[("wait", true)])
            .json(&json!({ "filter": filter.to_qdrant() }))
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(collection = %self.name, filter = %filter, "Points deleted");
        Ok(())
    }

    /// Create payload indexes, tolerating ones that already exist.
    pub async fn ensure_payload_indexes(
        &self,
        fields: &[(&str, &str)],
    ) -> Result<(), VectorStoreError> {
        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });
            let response = self
                .request(Method::PUT, "index")
                .query(&[("wait", true)])
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() || response.status() == StatusCode::CONFLICT {
                tracing::trace!(collection = %self.name, field, schema, "Payload index ensured");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = VectorStoreError::UnexpectedStatus { status, body };
                tracing::warn!(collection = %self.name, field, schema, error = %error, "Failed to ensure payload index");
            }
        }
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.connection
            .request(method, &format!("collections/{}/{path}", self.name))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<(), VectorStoreError> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = VectorStoreError::UnexpectedStatus { status, body };
    tracing::error!(error = %error, "Qdrant request failed");
    Err(error)
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

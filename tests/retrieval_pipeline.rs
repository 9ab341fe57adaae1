use std::sync::Arc;
use std::time::Duration;

use campuslink::{
    embedding::{EmbeddingSettings, HttpEmbeddingClient},
    processing::{ChunkingSettings, RetrievalService},
    qdrant::{FilterValue, VectorStoreGateway, VectorStoreSettings},
};
use httpmock::{
    Method::{GET, POST, PUT},
    MockServer,
};
use serde_json::json;

fn build_service(embedder: &MockServer, qdrant: &MockServer) -> RetrievalService {
    let embedding = HttpEmbeddingClient::new(EmbeddingSettings {
        url: embedder.url("/api/embed"),
        model: "bge-small-zh".into(),
        dimension: 3,
        api_key: None,
        timeout: Duration::from_secs(5),
    })
    .expect("embedding client");
    let gateway = VectorStoreGateway::new(VectorStoreSettings {
        host: qdrant.host(),
        port: qdrant.port(),
        collection: "project_docs".into(),
        alias: "default".into(),
        api_key: Some("secret".into()),
        timeout: Duration::from_secs(5),
    })
    .expect("gateway");
    RetrievalService::new(
        Arc::new(embedding),
        gateway,
        ChunkingSettings {
            max_chars: 500,
            overlap: 50,
        },
    )
}

async fn mock_qdrant_session(qdrant: &MockServer) {
    qdrant
        .mock_async(|when, then| {
            when.method(GET).path("/").header("api-key", "secret");
            then.status(200).json_body(json!({ "title": "qdrant" }));
        })
        .await;
    qdrant
        .mock_async(|when, then| {
            when.method(GET)
                .path("/collections/project_docs")
                .header("api-key", "secret");
            then.status(200)
                .json_body(json!({ "status": "ok", "result": { "status": "green" } }));
        })
        .await;
}

#[tokio::test]
async fn indexing_creates_collection_and_stores_chunks() {
    let embedder = MockServer::start_async().await;
    let qdrant = MockServer::start_async().await;
    mock_qdrant_session(&qdrant).await;

    let embed = embedder
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/embed")
                .json_body(json!({ "model": "bge-small-zh", "input": ["实习岗位介绍。"] }));
            then.status(200)
                .json_body(json!({ "embeddings": [[0.1, 0.2, 0.3]] }));
        })
        .await;
    let index = qdrant
        .mock_async(|when, then| {
            when.method(PUT).path("/collections/project_docs/index");
            then.status(200).json_body(json!({ "status": "ok" }));
        })
        .await;
    let delete = qdrant
        .mock_async(|when, then| {
            when.method(POST)
                .path("/collections/project_docs/points/delete")
                .query_param("wait", "true")
                .json_body(json!({
                    "filter": { "must": [ { "key": "id", "match": { "value": 12 } } ] }
                }));
            then.status(200).json_body(json!({ "status": "ok" }));
        })
        .await;
    let upsert = qdrant
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/collections/project_docs/points")
                .body_contains("\"chunk_index\":0")
                .body_contains("实习岗位介绍。");
            then.status(200).json_body(json!({ "status": "ok" }));
        })
        .await;

    let service = build_service(&embedder, &qdrant);
    let outcome = service
        .index_document(&FilterValue::Integer(12), "实习岗位介绍")
        .await
        .expect("indexed");

    embed.assert_async().await;
    assert_eq!(index.hits_async().await, 2);
    delete.assert_async().await;
    upsert.assert_async().await;
    assert_eq!(outcome.chunk_count, 1);
    assert!(!outcome.degraded);
    assert!(service.gateway().registry().active_aliases().is_empty());
}

#[tokio::test]
async fn document_chunks_come_back_in_order() {
    let embedder = MockServer::start_async().await;
    let qdrant = MockServer::start_async().await;
    mock_qdrant_session(&qdrant).await;
    qdrant
        .mock_async(|when, then| {
            when.method(POST).path("/collections/project_docs/points/scroll");
            then.status(200).json_body(json!({
                "status": "ok",
                "result": {
                    "points": [
                        { "id": "c", "payload": { "id": 12, "chunk_index": 2, "content": "三。" } },
                        { "id": "a", "payload": { "id": 12, "chunk_index": 0, "content": "一。" } },
                        { "id": "b", "payload": { "id": 12, "chunk_index": 1, "content": "二。" } }
                    ]
                }
            }));
        })
        .await;

    let service = build_service(&embedder, &qdrant);
    let chunks = service.document_chunks(&FilterValue::Integer(12), 10).await;
    let order: Vec<usize> = chunks.iter().map(|chunk| chunk.chunk_index).collect();
    assert_eq!(order, vec![0, 1, 2]);
    assert!(chunks.iter().all(|chunk| chunk.id == "12"));
}

#[tokio::test]
async fn search_filters_by_document() {
    let embedder = MockServer::start_async().await;
    let qdrant = MockServer::start_async().await;
    mock_qdrant_session(&qdrant).await;
    embedder
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(200)
                .json_body(json!({ "embeddings": [[1.0, 0.0, 0.0]] }));
        })
        .await;
    let query = qdrant
        .mock_async(|when, then| {
            when.method(POST)
                .path("/collections/project_docs/points/query")
                .body_contains("\"filter\"")
                .body_contains("\"proj-3\"");
            then.status(200).json_body(json!({
                "status": "ok",
                "result": { "points": [
                    { "id": "x", "score": 0.8, "payload": { "id": "proj-3", "chunk_index": 4, "content": "需求说明。" } }
                ] }
            }));
        })
        .await;

    let service = build_service(&embedder, &qdrant);
    let hits = service
        .search("需求", Some(&FilterValue::Text("proj-3".into())), 3)
        .await;

    query.assert_async().await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk_index, 4);
}

#[tokio::test]
async fn embedding_outage_yields_empty_search() {
    let embedder = MockServer::start_async().await;
    let qdrant = MockServer::start_async().await;
    embedder
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(503).body("overloaded");
        })
        .await;
    let health = qdrant
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200);
        })
        .await;

    let service = build_service(&embedder, &qdrant);
    assert!(service.search("任何问题", None, 5).await.is_empty());
    assert_eq!(health.hits_async().await, 0);
    assert_eq!(service.metrics_snapshot().degraded_batches, 1);
}

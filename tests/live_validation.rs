use std::{env, sync::Arc, sync::Once, time::Duration};

use campuslink::{
    config,
    embedding::{EmbeddingClient, HttpEmbeddingClient},
    processing::RetrievalService,
    qdrant::{FilterValue, VectorStoreGateway},
    verification::{
        CodeStore, CodeType, LogMailer, MailQueue, RedisCodeStore, RetryPolicy,
        ValidationOutcome, VerificationCode, VerificationService, VerificationSettings,
    },
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() -> &'static config::Config {
    INIT.call_once(|| {
        set_default_env("EMBEDDING_URL", "http://127.0.0.1:11434/api/embed");
        set_default_env("EMBEDDING_MODEL", "nomic-embed-text");
        set_default_env("EMBEDDING_DIMENSION", "768");
        set_default_env("VECTOR_STORE_COLLECTION", "campuslink-live");
        set_default_env("REDIS_URL", "redis://127.0.0.1:6379/");
        config::init_config().expect("live configuration");
    });
    config::get_config().expect("configuration installed")
}

#[tokio::test]
#[ignore = "Requires live embedding endpoint"]
async fn live_embedding_roundtrip() {
    let config = init_config_once();
    let client = HttpEmbeddingClient::new(config.embedding_settings()).expect("client");
    let vectors = client
        .generate_embeddings(vec!["校企合作项目简介".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    assert_eq!(
        vectors[0].len(),
        config.embedding_dimension,
        "embedding dimension mismatch"
    );
}

#[tokio::test]
#[ignore = "Requires live Qdrant and embedding endpoint"]
async fn live_index_then_query() {
    let config = init_config_once();
    let embedding = HttpEmbeddingClient::new(config.embedding_settings()).expect("client");
    let gateway = VectorStoreGateway::new(config.vector_store_settings()).expect("gateway");
    let service = RetrievalService::new(Arc::new(embedding), gateway, config.chunking_settings());

    let document = FilterValue::Integer(900_001);
    let outcome = service
        .index_document(&document, "项目背景。项目目标。项目成员。")
        .await
        .expect("indexed");
    let chunks = service.document_chunks(&document, 50).await;
    assert_eq!(chunks.len(), outcome.chunk_count);
    assert!(service.gateway().registry().active_aliases().is_empty());
}

#[tokio::test]
#[ignore = "Requires live Redis"]
async fn live_redis_consume_is_single_use() {
    let config = init_config_once();
    let url = config.redis_url.as_deref().expect("REDIS_URL");
    let store = Arc::new(RedisCodeStore::new(url, config.redis_timeout).expect("client"));

    let key = "code:live@campus.cn:login";
    let record = VerificationCode::issue("live@campus.cn", CodeType::Login, "424242".into());
    store
        .set_with_ttl(
            key,
            &serde_json::to_string(&record).expect("encode"),
            Duration::from_secs(30),
        )
        .await
        .expect("store record");

    assert_eq!(
        store.consume_code(key, "000000").await.expect("consume"),
        ValidationOutcome::IncorrectCode
    );
    assert_eq!(
        store.consume_code(key, "424242").await.expect("consume"),
        ValidationOutcome::Success
    );
    assert_eq!(
        store.consume_code(key, "424242").await.expect("consume"),
        ValidationOutcome::AlreadyUsed
    );
    let ttl = store.ttl(key).await.expect("ttl").expect("expiry kept");
    assert!(ttl <= Duration::from_secs(30));
}

#[tokio::test]
#[ignore = "Requires live Redis"]
async fn live_rate_limit_blocks_second_request() {
    let config = init_config_once();
    let url = config.redis_url.as_deref().expect("REDIS_URL");
    let store = Arc::new(RedisCodeStore::new(url, config.redis_timeout).expect("client"));
    let service = VerificationService::new(
        store,
        MailQueue::start(Arc::new(LogMailer), RetryPolicy::default()),
        VerificationSettings {
            code_ttl: Duration::from_secs(30),
            rate_limit_window: Duration::from_secs(5),
        },
    );

    let email = format!("rate-{}@campus.cn", std::process::id());
    assert!(service.request_code(&email, CodeType::Register).await);
    assert!(!service.request_code(&email, CodeType::Register).await);
    service.shutdown().await;
}

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::embedding::EmbeddingSettings;
use crate::processing::ChunkingSettings;
use crate::qdrant::VectorStoreSettings;
use crate::verification::{RetryPolicy, VerificationSettings};

const DEFAULT_VECTOR_STORE_HOST: &str = "127.0.0.1";
const DEFAULT_VECTOR_STORE_PORT: u16 = 6333;
const DEFAULT_VECTOR_STORE_ALIAS: &str = "default";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CHUNK_MAX_CHARS: usize = 500;
const DEFAULT_CHUNK_OVERLAP: usize = 50;
const DEFAULT_REDIS_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_CODE_TTL_SECS: u64 = 300;
const DEFAULT_RATE_LIMIT_SECS: u64 = 60;
const DEFAULT_MAIL_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_MAIL_RETRY_BASE_SECS: u64 = 60;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was installed twice.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the retrieval and verification services.
#[derive(Debug, Clone)]
pub struct Config {
    /// Endpoint receiving batched embedding requests.
    pub embedding_url: String,
    /// Embedding model identifier passed to the endpoint.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Optional bearer token for the embedding endpoint.
    pub embedding_api_key: Option<String>,
    /// Timeout applied to each embedding request.
    pub embedding_timeout: Duration,
    /// Host of the Qdrant instance.
    pub vector_store_host: String,
    /// REST port of the Qdrant instance.
    pub vector_store_port: u16,
    /// Collection holding document chunks.
    pub vector_store_collection: String,
    /// Optional API key required to access Qdrant.
    pub vector_store_api_key: Option<String>,
    /// Alias under which gateway connections are registered.
    pub vector_store_alias: String,
    /// Timeout applied to each Qdrant request.
    pub vector_store_timeout: Duration,
    /// Nominal upper bound on chunk length in characters.
    pub chunk_max_chars: usize,
    /// Characters carried over from the previous chunk.
    pub chunk_overlap: usize,
    /// Redis connection URL; the in-memory store is used when absent.
    pub redis_url: Option<String>,
    /// Timeout applied to each Redis command.
    pub redis_timeout: Duration,
    /// Lifetime of a stored verification code.
    pub verification_code_ttl: Duration,
    /// Window during which repeat code requests are rejected.
    pub verification_rate_limit: Duration,
    /// Mail relay endpoint; codes are only logged when absent.
    pub mail_relay_url: Option<String>,
    /// Maximum delivery attempts per code.
    pub mail_max_attempts: u32,
    /// Base delay multiplied by the attempt number between deliveries.
    pub mail_retry_base: Duration,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_dimension: usize = parse_required("EMBEDDING_DIMENSION")?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }

        Ok(Self {
            embedding_url: load_env("EMBEDDING_URL")?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension,
            embedding_api_key: load_env_optional("EMBEDDING_API_KEY"),
            embedding_timeout: Duration::from_secs(parse_optional(
                "EMBEDDING_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            vector_store_host: load_env_optional("VECTOR_STORE_HOST")
                .unwrap_or_else(|| DEFAULT_VECTOR_STORE_HOST.to_string()),
            vector_store_port: parse_optional("VECTOR_STORE_PORT", DEFAULT_VECTOR_STORE_PORT)?,
            vector_store_collection: load_env("VECTOR_STORE_COLLECTION")?,
            vector_store_api_key: load_env_optional("VECTOR_STORE_API_KEY"),
            vector_store_alias: load_env_optional("VECTOR_STORE_ALIAS")
                .unwrap_or_else(|| DEFAULT_VECTOR_STORE_ALIAS.to_string()),
            vector_store_timeout: Duration::from_secs(parse_optional(
                "VECTOR_STORE_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            chunk_max_chars: parse_optional("CHUNK_MAX_CHARS", DEFAULT_CHUNK_MAX_CHARS)?,
            chunk_overlap: parse_optional("CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
            redis_url: load_env_optional("REDIS_URL"),
            redis_timeout: Duration::from_millis(parse_optional(
                "REDIS_TIMEOUT_MS",
                DEFAULT_REDIS_TIMEOUT_MS,
            )?),
            verification_code_ttl: Duration::from_secs(parse_optional(
                "VERIFICATION_CODE_TTL_SECS",
                DEFAULT_CODE_TTL_SECS,
            )?),
            verification_rate_limit: Duration::from_secs(parse_optional(
                "VERIFICATION_RATE_LIMIT_SECS",
                DEFAULT_RATE_LIMIT_SECS,
            )?),
            mail_relay_url: load_env_optional("MAIL_RELAY_URL"),
            mail_max_attempts: parse_optional("MAIL_MAX_ATTEMPTS", DEFAULT_MAIL_MAX_ATTEMPTS)?,
            mail_retry_base: Duration::from_secs(parse_optional(
                "MAIL_RETRY_BASE_SECS",
                DEFAULT_MAIL_RETRY_BASE_SECS,
            )?),
        })
    }

    /// Settings handed to the embedding client.
    pub fn embedding_settings(&self) -> EmbeddingSettings {
        EmbeddingSettings {
            url: self.embedding_url.clone(),
            model: self.embedding_model.clone(),
            dimension: self.embedding_dimension,
            api_key: self.embedding_api_key.clone(),
            timeout: self.embedding_timeout,
        }
    }

    /// Settings handed to the vector store gateway.
    pub fn vector_store_settings(&self) -> VectorStoreSettings {
        VectorStoreSettings {
            host: self.vector_store_host.clone(),
            port: self.vector_store_port,
            collection: self.vector_store_collection.clone(),
            alias: self.vector_store_alias.clone(),
            api_key: self.vector_store_api_key.clone(),
            timeout: self.vector_store_timeout,
        }
    }

    /// Chunker parameters.
    pub fn chunking_settings(&self) -> ChunkingSettings {
        ChunkingSettings {
            max_chars: self.chunk_max_chars,
            overlap: self.chunk_overlap,
        }
    }

    /// Verification code lifetimes.
    pub fn verification_settings(&self) -> VerificationSettings {
        VerificationSettings {
            code_ttl: self.verification_code_ttl,
            rate_limit_window: self.verification_rate_limit,
        }
    }

    /// Retry policy for code delivery.
    pub fn mail_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.mail_max_attempts.max(1),
            base_delay: self.mail_retry_base,
        }
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_required<T: FromStr>(key: &str) -> Result<T, ConfigError> {
    load_env(key)?
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_optional<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, if [`init_config`] has run.
pub fn get_config() -> Option<&'static Config> {
    CONFIG.get()
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        embedding_url = %config.embedding_url,
        embedding_model = %config.embedding_model,
        vector_store = %format!("{}:{}", config.vector_store_host, config.vector_store_port),
        collection = %config.vector_store_collection,
        redis = config.redis_url.is_some(),
        mail_relay = config.mail_relay_url.is_some(),
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    CONFIG.get().ok_or(ConfigError::AlreadyInitialized)
}

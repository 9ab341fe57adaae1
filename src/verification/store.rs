//! Cache abstraction backing verification codes, plus the in-process implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::types::{ValidationOutcome, VerificationCode};

/// Errors raised by cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis rejected the command or the connection failed.
    #[error("Redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
    /// The command did not finish within the configured timeout.
    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),
    /// A stored record could not be encoded or decoded.
    #[error("Failed to (de)serialize cached record: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The server answered with a shape the client does not understand.
    #[error("Unexpected cache reply: {0}")]
    UnexpectedReply(String),
}

/// Key-value cache with TTLs and the atomic primitives code issuance relies on.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Store `value` under `key` for `ttl` only when the key is absent. Returns whether it was set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, CacheError>;

    /// Store `value` under `key` for `ttl`, replacing any previous value.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Current value of `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Remove `key` if present.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remaining lifetime of `key`; `None` when it is absent or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    /// Atomically validate `code` against the record under `key`, marking it used on success
    /// while keeping its remaining lifetime.
    async fn consume_code(&self, key: &str, code: &str) -> Result<ValidationOutcome, CacheError>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// Single-process store for development and tests.
///
/// One lock is held across each read-check-mutate-write, which gives the same atomicity as the
/// server-side script within a single process.
#[derive(Debug, Default)]
pub struct InMemoryCodeStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCodeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn sweep_expired(entries: &mut HashMap<String, Entry>, now: Instant) {
    entries.retain(|_, entry| entry.is_live(now));
}

#[async_trait]
impl CodeStore for InMemoryCodeStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        sweep_expired(&mut entries, now);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        sweep_expired(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now)))
    }

    async fn consume_code(&self, key: &str, code: &str) -> Result<ValidationOutcome, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(key).filter(|entry| entry.is_live(now)) else {
            return Ok(ValidationOutcome::InvalidOrExpired);
        };

        let mut record: VerificationCode = serde_json::from_str(&entry.value)?;
        let outcome = record.check(code);
        if outcome.is_success() {
            record.is_used = true;
            entry.value = serde_json::to_string(&record)?;
        }
        Ok(outcome)
    }
}

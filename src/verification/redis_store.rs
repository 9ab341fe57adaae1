//! Redis-backed code store.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use super::store::{CacheError, CodeStore};
use super::types::ValidationOutcome;

/// Validate-and-mark in one round trip. Replies `{status, message}`.
const CONSUME_CODE_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return {0, 'invalid or expired'}
end
local record = cjson.decode(raw)
if record['is_used'] then
  return {0, 'already used'}
end
if record['code'] ~= ARGV[1] then
  return {0, 'incorrect code'}
end
record['is_used'] = true
local ttl = redis.call('TTL', KEYS[1])
if ttl > 0 then
  redis.call('SETEX', KEYS[1], ttl, cjson.encode(record))
else
  redis.call('SET', KEYS[1], cjson.encode(record))
end
return {1, 'success'}
"#;

/// Store issuing commands over a multiplexed tokio connection.
pub struct RedisCodeStore {
    client: redis::Client,
    consume_script: redis::Script,
    timeout: Duration,
}

impl RedisCodeStore {
    /// Open a client for `url`. No connection is made until the first command.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Initialized Redis code store");
        Ok(Self {
            client,
            consume_script: redis::Script::new(CONSUME_CODE_SCRIPT),
            timeout,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        self.bounded(self.client.get_multiplexed_async_connection())
            .await
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, redis::RedisError>>,
    {
        match timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout(self.timeout)),
        }
    }
}

fn whole_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl CodeStore for RedisCodeStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(whole_seconds(ttl));
        let reply: Option<String> = self.bounded(cmd.query_async(&mut conn)).await?;
        Ok(reply.is_some())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = self
            .bounded(conn.set_ex(key, value, whole_seconds(ttl)))
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = self.bounded(conn.get(key)).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: i64 = self.bounded(conn.del(key)).await?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.connection().await?;
        let seconds: i64 = self.bounded(conn.ttl(key)).await?;
        Ok(u64::try_from(seconds).ok().map(Duration::from_secs))
    }

    async fn consume_code(&self, key: &str, code: &str) -> Result<ValidationOutcome, CacheError> {
        let mut conn = self.connection().await?;
        let mut invocation = self.consume_script.key(key);
        invocation.arg(code);
        let (status, message): (i64, String) =
            self.bounded(invocation.invoke_async(&mut conn)).await?;
        ValidationOutcome::from_reply(status, &message)
            .ok_or_else(|| CacheError::UnexpectedReply(format!("{status} {message}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_urls() {
        assert!(matches!(
            RedisCodeStore::new("not a url", Duration::from_millis(50)),
            Err(CacheError::Redis(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_reports_error() {
        let store = RedisCodeStore::new("redis://127.0.0.1:9/", Duration::from_millis(500))
            .expect("client");
        assert!(store.get("code:missing").await.is_err());
    }

    fn script_replies() -> Vec<(i64, String)> {
        CONSUME_CODE_SCRIPT
            .lines()
            .filter_map(|line| line.trim().strip_prefix("return {"))
            .map(|reply| {
                let reply = reply.trim_end_matches('}');
                let (status, message) = reply.split_once(',').expect("status and message");
                (
                    status.trim().parse().expect("numeric status"),
                    message.trim().trim_matches('\'').to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn script_replies_map_to_outcomes() {
        let outcomes: Vec<ValidationOutcome> = script_replies()
            .into_iter()
            .map(|(status, message)| {
                ValidationOutcome::from_reply(status, &message)
                    .unwrap_or_else(|| panic!("unmapped reply {{{status}, {message}}}"))
            })
            .collect();

        assert_eq!(
            outcomes,
            vec![
                ValidationOutcome::InvalidOrExpired,
                ValidationOutcome::AlreadyUsed,
                ValidationOutcome::IncorrectCode,
                ValidationOutcome::Success,
            ]
        );
    }

    #[test]
    fn ttl_rounds_up_to_one_second() {
        assert_eq!(whole_seconds(Duration::from_millis(10)), 1);
        assert_eq!(whole_seconds(Duration::from_secs(300)), 300);
    }
}

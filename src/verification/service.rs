//! Code issuance and validation on top of a [`CodeStore`].

use std::sync::Arc;

use super::mail::{CodeDelivery, MailQueue};
use super::store::CodeStore;
use super::types::{
    CodeType, ValidationOutcome, VerificationCode, VerificationSettings, code_key,
    generate_code, limit_key,
};

/// Issues, rate-limits and validates one-time codes.
///
/// All mutual exclusion lives in the store: the rate limit is a set-if-absent and validation
/// is a single atomic consume, so the service itself holds no locks.
pub struct VerificationService {
    store: Arc<dyn CodeStore>,
    mail: MailQueue,
    settings: VerificationSettings,
}

impl VerificationService {
    /// Assemble a service from its collaborators.
    pub fn new(store: Arc<dyn CodeStore>, mail: MailQueue, settings: VerificationSettings) -> Self {
        Self {
            store,
            mail,
            settings,
        }
    }

    /// Issue a code for `(email, code_type)` and queue its delivery.
    ///
    /// Returns `false` when a request for the same key landed within the rate-limit window, or
    /// when the cache fails. A request that fails after claiming the rate-limit slot releases it
    /// again. Delivery failures never affect the result.
    pub async fn request_code(&self, email: &str, code_type: CodeType) -> bool {
        let limit = limit_key(email, code_type);
        match self
            .store
            .set_if_absent(&limit, "1", self.settings.rate_limit_window)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(email, code_type = %code_type, "Code request rate limited");
                return false;
            }
            Err(error) => {
                tracing::error!(email, code_type = %code_type, error = %error, "Rate limit check failed");
                return false;
            }
        }

        let record = VerificationCode::issue(email, code_type, generate_code());
        let encoded = match serde_json::to_string(&record) {
            Ok(encoded) => encoded,
            Err(error) => {
                tracing::error!(email, error = %error, "Failed to encode verification code");
                self.release_rate_limit(&limit).await;
                return false;
            }
        };
        if let Err(error) = self
            .store
            .set_with_ttl(&code_key(email, code_type), &encoded, self.settings.code_ttl)
            .await
        {
            tracing::error!(email, code_type = %code_type, error = %error, "Failed to store verification code");
            self.release_rate_limit(&limit).await;
            return false;
        }

        let delivery = CodeDelivery {
            email: record.email,
            code: record.code,
            code_type,
        };
        if let Err(error) = self.mail.enqueue(delivery) {
            tracing::error!(email, code_type = %code_type, error = %error, "Failed to queue code delivery");
        }
        tracing::info!(email, code_type = %code_type, "Verification code issued");
        true
    }

    async fn release_rate_limit(&self, limit: &str) {
        if let Err(error) = self.store.delete(limit).await {
            tracing::warn!(key = limit, error = %error, "Failed to release rate limit");
        }
    }

    /// Validate `code` for `(email, code_type)`, consuming it on success.
    pub async fn validate_code(
        &self,
        email: &str,
        code: &str,
        code_type: CodeType,
    ) -> ValidationOutcome {
        let outcome = match self
            .store
            .consume_code(&code_key(email, code_type), code)
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(email, code_type = %code_type, error = %error, "Code validation failed");
                ValidationOutcome::Unavailable
            }
        };
        tracing::info!(email, code_type = %code_type, outcome = %outcome, "Code validated");
        outcome
    }

    /// Stop the mail worker after in-flight deliveries finish.
    pub async fn shutdown(self) {
        self.mail.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verification::mail::{LogMailer, RetryPolicy};
    use crate::verification::store::{CacheError, InMemoryCodeStore};
    use async_trait::async_trait;
    use std::time::Duration;

    fn service(store: Arc<dyn CodeStore>) -> VerificationService {
        let mail = MailQueue::start(Arc::new(LogMailer), RetryPolicy::default());
        VerificationService::new(store, mail, VerificationSettings::default())
    }

    async fn stored_code(store: &InMemoryCodeStore, email: &str, code_type: CodeType) -> String {
        let raw = store
            .get(&code_key(email, code_type))
            .await
            .expect("get")
            .expect("record");
        let record: VerificationCode = serde_json::from_str(&raw).expect("decode");
        record.code
    }

    #[tokio::test]
    async fn second_request_within_window_is_rejected() {
        let store = Arc::new(InMemoryCodeStore::new());
        let service = service(store.clone());

        assert!(service.request_code("a@campus.cn", CodeType::Register).await);
        assert!(!service.request_code("a@campus.cn", CodeType::Register).await);
        assert!(service.request_code("a@campus.cn", CodeType::Login).await);
    }

    #[tokio::test]
    async fn issued_record_uses_code_ttl() {
        let store = Arc::new(InMemoryCodeStore::new());
        let service = service(store.clone());
        assert!(service.request_code("a@campus.cn", CodeType::Login).await);

        let ttl = store
            .ttl(&code_key("a@campus.cn", CodeType::Login))
            .await
            .expect("ttl")
            .expect("expiry");
        assert!(ttl <= Duration::from_secs(300) && ttl > Duration::from_secs(290));
    }

    #[tokio::test]
    async fn code_validates_once() {
        let store = Arc::new(InMemoryCodeStore::new());
        let service = service(store.clone());
        assert!(service.request_code("b@campus.cn", CodeType::ResetPassword).await);
        let code = stored_code(&store, "b@campus.cn", CodeType::ResetPassword).await;

        assert_eq!(
            service
                .validate_code("b@campus.cn", &code, CodeType::ResetPassword)
                .await
                .as_pair(),
            (true, "success")
        );
        assert_eq!(
            service
                .validate_code("b@campus.cn", &code, CodeType::ResetPassword)
                .await
                .as_pair(),
            (false, "already used")
        );
    }

    #[tokio::test]
    async fn wrong_code_and_missing_record_are_distinguished() {
        let store = Arc::new(InMemoryCodeStore::new());
        let service = service(store.clone());
        assert!(service.request_code("c@campus.cn", CodeType::ChangeEmail).await);
        let code = stored_code(&store, "c@campus.cn", CodeType::ChangeEmail).await;
        let wrong = if code == "000000" { "111111" } else { "000000" };

        assert_eq!(
            service
                .validate_code("c@campus.cn", wrong, CodeType::ChangeEmail)
                .await,
            ValidationOutcome::IncorrectCode
        );
        assert_eq!(
            service
                .validate_code("c@campus.cn", &code, CodeType::Login)
                .await,
            ValidationOutcome::InvalidOrExpired
        );
        assert_eq!(
            service
                .validate_code("c@campus.cn", &code, CodeType::ChangeEmail)
                .await,
            ValidationOutcome::Success
        );
    }

    #[tokio::test]
    async fn concurrent_validations_succeed_exactly_once() {
        let store = Arc::new(InMemoryCodeStore::new());
        let service = Arc::new(service(store.clone()));
        assert!(service.request_code("d@campus.cn", CodeType::Login).await);
        let code = stored_code(&store, "d@campus.cn", CodeType::Login).await;

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..100 {
            let service = Arc::clone(&service);
            let code = code.clone();
            tasks.spawn(async move {
                service
                    .validate_code("d@campus.cn", &code, CodeType::Login)
                    .await
            });
        }

        let mut successes = 0;
        let mut already_used = 0;
        while let Some(outcome) = tasks.join_next().await {
            match outcome.expect("task") {
                ValidationOutcome::Success => successes += 1,
                ValidationOutcome::AlreadyUsed => already_used += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(already_used, 99);
    }

    struct DownStore;

    #[async_trait]
    impl CodeStore for DownStore {
        async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, CacheError> {
            Err(CacheError::Timeout(Duration::from_millis(1)))
        }

        async fn set_with_ttl(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Timeout(Duration::from_millis(1)))
        }

        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Timeout(Duration::from_millis(1)))
        }

        async fn delete(&self, _: &str) -> Result<(), CacheError> {
            Err(CacheError::Timeout(Duration::from_millis(1)))
        }

        async fn ttl(&self, _: &str) -> Result<Option<Duration>, CacheError> {
            Err(CacheError::Timeout(Duration::from_millis(1)))
        }

        async fn consume_code(&self, _: &str, _: &str) -> Result<ValidationOutcome, CacheError> {
            Err(CacheError::Timeout(Duration::from_millis(1)))
        }
    }

    /// Accepts rate-limit claims but refuses the first record write.
    struct RecordWriteFails {
        inner: InMemoryCodeStore,
        fail_next_write: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl CodeStore for RecordWriteFails {
        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
            self.inner.set_if_absent(key, value, ttl).await
        }

        async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
            if self
                .fail_next_write
                .swap(false, std::sync::atomic::Ordering::SeqCst)
            {
                return Err(CacheError::Timeout(Duration::from_millis(1)));
            }
            self.inner.set_with_ttl(key, value, ttl).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.inner.delete(key).await
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
            self.inner.ttl(key).await
        }

        async fn consume_code(&self, key: &str, code: &str) -> Result<ValidationOutcome, CacheError> {
            self.inner.consume_code(key, code).await
        }
    }

    #[tokio::test]
    async fn failed_record_write_releases_rate_limit() {
        let store = Arc::new(RecordWriteFails {
            inner: InMemoryCodeStore::new(),
            fail_next_write: std::sync::atomic::AtomicBool::new(true),
        });
        let service = service(store.clone());

        assert!(!service.request_code("f@campus.cn", CodeType::Register).await);
        assert_eq!(
            store
                .get(&limit_key("f@campus.cn", CodeType::Register))
                .await
                .expect("get"),
            None
        );
        assert!(service.request_code("f@campus.cn", CodeType::Register).await);
    }

    #[tokio::test]
    async fn cache_failures_degrade_without_panicking() {
        let service = service(Arc::new(DownStore));
        assert!(!service.request_code("e@campus.cn", CodeType::Register).await);
        assert_eq!(
            service
                .validate_code("e@campus.cn", "123456", CodeType::Register)
                .await
                .as_pair(),
            (false, "verification service unavailable")
        );
    }
}

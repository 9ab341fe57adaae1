//! One-time verification codes: issuance, rate limiting, atomic validation, and delivery.

pub mod mail;
pub mod redis_store;
mod service;
pub mod store;
pub mod types;

pub use mail::{CodeDelivery, LogMailer, MailError, MailQueue, Mailer, RelayMailer, RetryPolicy};
pub use redis_store::RedisCodeStore;
pub use service::VerificationService;
pub use store::{CacheError, CodeStore, InMemoryCodeStore};
pub use types::{CodeType, ValidationOutcome, VerificationCode, VerificationSettings};

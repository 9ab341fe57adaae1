//! Fire-and-forget delivery of verification codes.
//!
//! [`MailQueue::enqueue`] hands a delivery to a background worker and returns immediately.
//! The worker runs each delivery in its own task, retrying failed attempts with a linear
//! backoff (`base_delay × attempt`). Deliveries that exhaust their attempts are logged and dropped.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use super::types::CodeType;

/// Errors raised while delivering a code.
#[derive(Debug, Error)]
pub enum MailError {
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Relay answered with a non-success status.
    #[error("Mail relay returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the relay.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// The delivery worker has stopped.
    #[error("Mail queue is closed")]
    QueueClosed,
}

/// One code to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeDelivery {
    /// Recipient address.
    pub email: String,
    /// Code to deliver.
    pub code: String,
    /// Purpose of the code.
    pub code_type: CodeType,
}

/// Transport delivering a single message attempt.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Attempt one delivery.
    async fn send(&self, delivery: &CodeDelivery) -> Result<(), MailError>;
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    subject: &'a str,
    code: &'a str,
    code_type: CodeType,
}

/// Mailer posting JSON messages to an HTTP mail relay.
pub struct RelayMailer {
    http: Client,
    url: String,
}

impl RelayMailer {
    /// Build a relay mailer for `url`.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, MailError> {
        let http = Client::builder()
            .user_agent("campuslink/0.1")
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, delivery: &CodeDelivery) -> Result<(), MailError> {
        let message = RelayMessage {
            to: &delivery.email,
            subject: delivery.code_type.subject(),
            code: &delivery.code,
            code_type: delivery.code_type,
        };
        let response = self.http.post(&self.url).json(&message).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(MailError::UnexpectedStatus { status, body })
    }
}

/// Mailer that only logs deliveries. Used when no relay is configured.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, delivery: &CodeDelivery) -> Result<(), MailError> {
        tracing::info!(
            email = %delivery.email,
            code_type = %delivery.code_type,
            code = %delivery.code,
            "Verification code (no mail relay configured)"
        );
        Ok(())
    }
}

/// Bounded retry schedule for deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `base_delay × n` after failing.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(60),
        }
    }
}

/// Deliver with retries. Returns the number of attempts used on success, or the last error.
pub async fn deliver_with_retry(
    mailer: &dyn Mailer,
    policy: RetryPolicy,
    delivery: &CodeDelivery,
) -> Result<u32, MailError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match mailer.send(delivery).await {
            Ok(()) => return Ok(attempt),
            Err(error) if attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    email = %delivery.email,
                    attempt,
                    retry_in_secs = delay.as_secs(),
                    error = %error,
                    "Code delivery failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[derive(Debug)]
struct MailJob {
    id: Uuid,
    delivery: CodeDelivery,
}

/// Handle to the background delivery worker.
pub struct MailQueue {
    sender: mpsc::UnboundedSender<MailJob>,
    worker: JoinHandle<()>,
}

impl MailQueue {
    /// Spawn the worker on the current runtime.
    pub fn start(mailer: Arc<dyn Mailer>, policy: RetryPolicy) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(receiver, mailer, policy));
        Self { sender, worker }
    }

    /// Queue a delivery without waiting for it. Returns the job id.
    pub fn enqueue(&self, delivery: CodeDelivery) -> Result<Uuid, MailError> {
        let id = Uuid::new_v4();
        self.sender
            .send(MailJob { id, delivery })
            .map_err(|_| MailError::QueueClosed)?;
        tracing::debug!(job = %id, "Mail job queued");
        Ok(id)
    }

    /// Stop accepting jobs and wait for in-flight deliveries, retries included.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(error) = self.worker.await {
            tracing::error!(error = %error, "Mail worker terminated abnormally");
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<MailJob>,
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
) {
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            job = receiver.recv() => match job {
                Some(job) => {
                    let mailer = Arc::clone(&mailer);
                    tasks.spawn(async move { run_job(mailer.as_ref(), policy, job).await });
                }
                None => break,
            },
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }
    while tasks.join_next().await.is_some() {}
}

async fn run_job(mailer: &dyn Mailer, policy: RetryPolicy, job: MailJob) {
    match deliver_with_retry(mailer, policy, &job.delivery).await {
        Ok(attempts) => tracing::info!(
            job = %job.id,
            email = %job.delivery.email,
            code_type = %job.delivery.code_type,
            attempts,
            "Verification code delivered"
        ),
        Err(error) => tracing::error!(
            job = %job.id,
            email = %job.delivery.email,
            code_type = %job.delivery.code_type,
            attempts = policy.max_attempts,
            error = %error,
            "Verification code delivery failed permanently"
        ),
    }
}

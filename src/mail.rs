//! Email delivery abstraction.
//!
//! This module defines the `Mailer` trait so the outbox can deliver through a
//! real relay in production and a recording mock in tests.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::error::{RegistrarError, Result};

/// Subject line used for every request status email.
pub const STATUS_UPDATE_SUBJECT: &str = "Request Status Update";

/// A message waiting to be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Trait for delivering email.
///
/// # Example
/// ```ignore
/// let mailer = WebhookMailer::new("https://mail.example.edu/send", None);
/// mailer.send(&Email::new("60001@example.edu", "Hello", "Body")).await?;
/// ```
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    /// Returns an error if the relay rejects the message or cannot be reached.
    async fn send(&self, email: &Email) -> Result<()>;
}

// ============================================================================
// Logging implementation
// ============================================================================

/// Mailer that only writes the message to the log.
///
/// Suits development setups without a mail relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.body,
            "Email (log only)"
        );
        Ok(())
    }
}

// ============================================================================
// Production implementation posting to an HTTP mail relay
// ============================================================================

/// Mailer that POSTs each message as JSON to an HTTP mail relay.
///
/// The payload is `{"to": ..., "subject": ..., "body": ...}`. Any non-2xx
/// response counts as a delivery failure.
#[derive(Clone)]
pub struct WebhookMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl WebhookMailer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    #[tracing::instrument(skip(self, email), fields(to = %email.to, endpoint = %self.endpoint))]
    async fn send(&self, email: &Email) -> Result<()> {
        let payload = serde_json::to_string(email)?;

        let mut req = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .body(payload);

        // Only add Authorization header if an api key is configured
        if let Some(api_key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(error = %e, "Mail relay request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistrarError::Mail(format!(
                "relay returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        tracing::debug!(status = status.as_u16(), "Email accepted by relay");
        Ok(())
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Mock mailer for testing.
///
/// Records every delivery attempt. Attempts succeed unless a failure has been
/// queued with [`MockMailer::fail_next`] or the mailer is switched to
/// [`MockMailer::fail_always`].
#[derive(Clone, Default)]
pub struct MockMailer {
    attempts: Arc<Mutex<Vec<Email>>>,
    delivered: Arc<Mutex<Vec<Email>>>,
    queued_failures: Arc<Mutex<VecDeque<String>>>,
    always_fail: Arc<Mutex<Option<String>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` attempts fail with `message`.
    pub fn fail_next(&self, count: usize, message: &str) {
        let mut failures = self.queued_failures.lock();
        for _ in 0..count {
            failures.push_back(message.to_string());
        }
    }

    /// Make every attempt fail until cleared with `None`.
    pub fn fail_always(&self, message: Option<&str>) {
        *self.always_fail.lock() = message.map(str::to_string);
    }

    /// Every message handed to `send`, including failed attempts.
    pub fn attempts(&self) -> Vec<Email> {
        self.attempts.lock().clone()
    }

    /// Messages that were delivered successfully.
    pub fn delivered(&self) -> Vec<Email> {
        self.delivered.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        self.attempts.lock().push(email.clone());

        let failure = self
            .always_fail
            .lock()
            .clone()
            .or_else(|| self.queued_failures.lock().pop_front());

        match failure {
            Some(message) => Err(RegistrarError::Mail(message)),
            None => {
                self.delivered.lock().push(email.clone());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> Email {
        Email::new(
            "amira@example.edu",
            STATUS_UPDATE_SUBJECT,
            "Your request for \"Transcript\" has been processed.",
        )
    }

    #[tokio::test]
    async fn test_mock_mailer_records_delivery() {
        let mock = MockMailer::new();
        mock.send(&email()).await.unwrap();

        assert_eq!(mock.attempt_count(), 1);
        let delivered = mock.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].to, "amira@example.edu");
        assert_eq!(delivered[0].subject, "Request Status Update");
    }

    #[tokio::test]
    async fn test_mock_mailer_queued_failures_are_fifo() {
        let mock = MockMailer::new();
        mock.fail_next(2, "relay down");

        assert!(matches!(
            mock.send(&email()).await,
            Err(RegistrarError::Mail(m)) if m == "relay down"
        ));
        assert!(mock.send(&email()).await.is_err());
        assert!(mock.send(&email()).await.is_ok());

        assert_eq!(mock.attempt_count(), 3);
        assert_eq!(mock.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_mailer_fail_always() {
        let mock = MockMailer::new();
        mock.fail_always(Some("mailbox full"));
        assert!(mock.send(&email()).await.is_err());
        assert!(mock.send(&email()).await.is_err());

        mock.fail_always(None);
        assert!(mock.send(&email()).await.is_ok());
    }

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        assert!(LogMailer.send(&email()).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_mailer_unreachable_relay_fails() {
        // Port 9 (discard) on localhost is closed in test environments.
        let mailer = WebhookMailer::new("http://127.0.0.1:9/send", None)
            .with_timeout(Duration::from_millis(500));
        assert!(mailer.send(&email()).await.is_err());
    }
}

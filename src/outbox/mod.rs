//! Mail outbox: best-effort email delivery decoupled from request transitions.
//!
//! Lifecycle operations hand messages to a [`MailOutbox`] after their store
//! writes have committed and return immediately. A background dispatcher task
//! delivers them through a [`Mailer`], retrying failures with exponential
//! backoff. A message that still fails after the last retry is logged and
//! dropped; nothing is reported back to the operation that queued it.
//!
//! Shutdown is cooperative: cancelling the token stops intake and the
//! dispatcher drains what is already queued before exiting.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::mail::{Email, Mailer};

/// Configuration for the outbox dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Maximum number of retries after the first failed attempt
    pub max_retries: u32,

    /// Base backoff duration in milliseconds (will be exponentially increased)
    pub backoff_ms: u64,

    /// Factor by which the backoff_ms is increased with each retry
    pub backoff_factor: u64,

    /// Maximum backoff time in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 1000,
            backoff_factor: 2,
            max_backoff_ms: 30000,
        }
    }
}

impl OutboxConfig {
    /// Delay before retry number `retry_attempt` (0-based):
    /// `backoff_ms * backoff_factor ^ retry_attempt`, capped at `max_backoff_ms`.
    pub fn backoff(&self, retry_attempt: u32) -> Duration {
        let exponential = self
            .backoff_ms
            .saturating_mul(self.backoff_factor.saturating_pow(retry_attempt));
        Duration::from_millis(exponential.min(self.max_backoff_ms))
    }
}

/// Handle used to queue email for background delivery.
///
/// Cheap to clone; all clones feed the same dispatcher.
#[derive(Clone)]
pub struct MailOutbox {
    tx: mpsc::UnboundedSender<Email>,
}

impl MailOutbox {
    /// Spawn the dispatcher task and return a handle to it.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Example
    /// ```ignore
    /// let shutdown = CancellationToken::new();
    /// let (outbox, dispatcher) = MailOutbox::start(Arc::new(LogMailer), OutboxConfig::default(), shutdown.clone());
    /// // ...
    /// shutdown.cancel();
    /// dispatcher.await?;
    /// ```
    pub fn start<M: Mailer + ?Sized + 'static>(
        mailer: Arc<M>,
        config: OutboxConfig,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            mailer,
            config,
            shutdown,
        };
        let handle = tokio::spawn(dispatcher.run(rx));
        (Self { tx }, handle)
    }

    /// Queue a message. Never blocks and never fails the caller.
    pub fn enqueue(&self, email: Email) {
        if let Err(e) = self.tx.send(email) {
            counter!("registrar_mail_total", "outcome" => "dropped").increment(1);
            tracing::warn!(
                to = %e.0.to,
                subject = %e.0.subject,
                "Mail dispatcher has stopped, dropping email"
            );
        }
    }
}

struct Dispatcher<M: Mailer + ?Sized> {
    mailer: Arc<M>,
    config: OutboxConfig,
    shutdown: CancellationToken,
}

impl<M: Mailer + ?Sized> Dispatcher<M> {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Email>) {
        tracing::info!("Mail dispatcher started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    rx.close();
                    let mut drained = 0usize;
                    while let Some(email) = rx.recv().await {
                        self.deliver(email).await;
                        drained += 1;
                    }
                    tracing::info!(drained, "Mail dispatcher shutting down");
                    break;
                }
                next = rx.recv() => match next {
                    Some(email) => self.deliver(email).await,
                    None => {
                        tracing::info!("All outbox handles dropped, mail dispatcher exiting");
                        break;
                    }
                },
            }
        }
    }

    async fn deliver(&self, email: Email) {
        let mut retry_attempt = 0u32;
        loop {
            match self.mailer.send(&email).await {
                Ok(()) => {
                    counter!("registrar_mail_total", "outcome" => "delivered").increment(1);
                    tracing::debug!(to = %email.to, subject = %email.subject, retry_attempt, "Email delivered");
                    return;
                }
                Err(e) if retry_attempt < self.config.max_retries => {
                    let delay = self.config.backoff(retry_attempt);
                    tracing::warn!(
                        to = %email.to,
                        error = %e,
                        retry_attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Email delivery failed, retrying"
                    );
                    counter!("registrar_mail_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    retry_attempt += 1;
                }
                Err(e) => {
                    counter!("registrar_mail_total", "outcome" => "failed").increment(1);
                    tracing::error!(
                        to = %email.to,
                        subject = %email.subject,
                        error = %e,
                        attempts = retry_attempt + 1,
                        "Email delivery failed, giving up"
                    );
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::MockMailer;

    fn fast_config(max_retries: u32) -> OutboxConfig {
        OutboxConfig {
            max_retries,
            backoff_ms: 1,
            backoff_factor: 2,
            max_backoff_ms: 5,
        }
    }

    fn email(n: usize) -> Email {
        Email::new("amira@example.edu", "Request Status Update", format!("message {}", n))
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = OutboxConfig {
            max_retries: 10,
            backoff_ms: 100,
            backoff_factor: 2,
            max_backoff_ms: 1000,
        };
        assert_eq!(config.backoff(0), Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(800));
        assert_eq!(config.backoff(4), Duration::from_millis(1000));
        assert_eq!(config.backoff(60), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_delivers_queued_mail_in_order() {
        let mailer = Arc::new(MockMailer::new());
        let shutdown = CancellationToken::new();
        let (outbox, handle) = MailOutbox::start(mailer.clone(), fast_config(0), shutdown.clone());

        for n in 0..3 {
            outbox.enqueue(email(n));
        }
        shutdown.cancel();
        handle.await.unwrap();

        let bodies: Vec<String> = mailer.delivered().into_iter().map(|e| e.body).collect();
        assert_eq!(bodies, vec!["message 0", "message 1", "message 2"]);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mailer = Arc::new(MockMailer::new());
        mailer.fail_next(2, "relay busy");
        let shutdown = CancellationToken::new();
        let (outbox, handle) = MailOutbox::start(mailer.clone(), fast_config(3), shutdown.clone());

        outbox.enqueue(email(0));
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(mailer.attempt_count(), 3);
        assert_eq!(mailer.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let mailer = Arc::new(MockMailer::new());
        mailer.fail_always(Some("relay down"));
        let shutdown = CancellationToken::new();
        let (outbox, handle) = MailOutbox::start(mailer.clone(), fast_config(2), shutdown.clone());

        outbox.enqueue(email(0));
        outbox.enqueue(email(1));
        shutdown.cancel();
        handle.await.unwrap();

        // One initial attempt plus two retries per message.
        assert_eq!(mailer.attempt_count(), 6);
        assert!(mailer.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_is_dropped_quietly() {
        let mailer = Arc::new(MockMailer::new());
        let shutdown = CancellationToken::new();
        let (outbox, handle) = MailOutbox::start(mailer.clone(), fast_config(0), shutdown.clone());

        shutdown.cancel();
        handle.await.unwrap();

        outbox.enqueue(email(0));
        assert_eq!(mailer.attempt_count(), 0);
    }
}

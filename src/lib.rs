//! Student-services request queue with working-calendar completion estimates.
//!
//! Students submit service requests (transcripts, enrollment letters, grade
//! appeals) that admins process, resolve or reject. Each request type has its
//! own FIFO queue, and every submission gets an estimated completion time
//! computed by consuming working minutes on a weekday business-hours calendar.
//!
//! Every transition records a notification for the student and, except for
//! plain processing, queues an email. Email goes through a background outbox
//! with retry and backoff, so a mail failure never fails the transition.
//!
//! The crate is a library: an external HTTP layer calls into
//! [`RequestLifecycle`] and [`AccountService`], with storage injected through
//! the [`Storage`] and [`AccountStorage`] traits.
//!
//! # Example
//! ```ignore
//! let config = RegistrarConfig::from_env();
//! let shutdown = CancellationToken::new();
//! let (outbox, dispatcher) =
//!     MailOutbox::start(config.mailer(), config.outbox.clone(), shutdown.clone());
//!
//! let storage = Arc::new(InMemoryStorage::new());
//! let accounts = AccountService::from_config(storage.clone(), outbox.clone(), &config);
//! let lifecycle = RequestLifecycle::new(storage, outbox).with_config(&config)?;
//!
//! let student = accounts.register_student("amira@example.edu").await?;
//!
//! let request = lifecycle
//!     .submit_request(&student.id, "Transcript", "Fall 2025", "Official copy")
//!     .await?;
//! println!("ready around {}", request.data.estimated_completion);
//!
//! shutdown.cancel();
//! dispatcher.await?;
//! ```

pub mod accounts;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod mail;
pub mod metrics;
pub mod outbox;
pub mod queue;
pub mod request;
pub mod storage;

// Re-export commonly used types
pub use accounts::AccountService;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::RegistrarConfig;
pub use domain::notification::{Notification, NotificationId};
pub use domain::session::Session;
pub use domain::student::{AccountRole, ContactDetails, Student};
pub use error::{RegistrarError, Result};
pub use lifecycle::{RequestLifecycle, ReviewAction, ReviewOutcome};
pub use mail::{Email, LogMailer, Mailer, MockMailer, WebhookMailer};
#[cfg(feature = "metrics")]
pub use crate::metrics::RegistrarMetrics;
pub use outbox::{MailOutbox, OutboxConfig};
pub use queue::{CalendarConfig, QueueDetail, QueueEstimator, WorkingCalendar};
pub use request::*;
pub use storage::memory::InMemoryStorage;
#[cfg(feature = "postgres")]
pub use storage::postgres::{PoolProvider, PostgresStorage, TestDbPools};
pub use storage::{AccountStorage, Storage};

/// Get the registrar database migrator
///
/// Returns a migrator that can be run against a connection pool.
#[cfg(feature = "postgres")]
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

//! Request lifecycle manager.
//!
//! [`RequestLifecycle`] is the surface the HTTP layer calls into. Every
//! operation is a short sequence of independent store calls:
//!
//! 1. the status change is persisted (conditional on the prior status),
//! 2. a [`Notification`] is recorded for the owning student,
//! 3. an email is handed to the [`MailOutbox`].
//!
//! Step 3 cannot fail the operation. Mail goes through a background dispatcher
//! with its own retry policy, and a student without an account record simply
//! gets no email.

use std::str::FromStr;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;

use crate::accounts::contact_email;
use crate::clock::Clock;
use crate::config::RegistrarConfig;
use crate::domain::notification::Notification;
use crate::error::{RegistrarError, Result};
use crate::mail::{Email, STATUS_UPDATE_SUBJECT};
use crate::outbox::MailOutbox;
use crate::queue::{QueueDetail, QueueEstimator, WorkingCalendar};
use crate::request::{
    AnyRequest, Canceled, Pending, Processed, Request, RequestData, RequestId, RequestStatus,
    RequestType, SemesterFilter,
};
use crate::storage::{AccountStorage, Storage};

#[cfg(feature = "metrics")]
use crate::metrics::RegistrarMetrics;

mod messages;

/// Admin decision on a pending (or already decided) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Resolve,
    Reject,
}

impl FromStr for ReviewAction {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "resolve" => Ok(ReviewAction::Resolve),
            "reject" => Ok(ReviewAction::Reject),
            other => Err(RegistrarError::ValidationError(format!(
                "unknown review action '{}', expected 'resolve' or 'reject'",
                other
            ))),
        }
    }
}

/// Result of [`RequestLifecycle::resolve_or_reject`].
///
/// A missing request is an outcome rather than an error so the caller can
/// fall back to its listing view.
#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    Applied(AnyRequest),
    NotFound(RequestId),
}

/// Owns the request state machine and its side effects.
///
/// Holds no request state between calls: everything is read from and written
/// to the injected storage.
pub struct RequestLifecycle<S> {
    storage: Arc<S>,
    estimator: QueueEstimator,
    outbox: MailOutbox,
    #[cfg(feature = "metrics")]
    metrics: Option<RegistrarMetrics>,
}

impl<S> Clone for RequestLifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            estimator: self.estimator.clone(),
            outbox: self.outbox.clone(),
            #[cfg(feature = "metrics")]
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: Storage + AccountStorage + 'static> RequestLifecycle<S> {
    /// Create a lifecycle manager with the default calendar and the system clock.
    pub fn new(storage: Arc<S>, outbox: MailOutbox) -> Self {
        Self {
            storage,
            estimator: QueueEstimator::default(),
            outbox,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.estimator = QueueEstimator::new(self.estimator.calendar().clone(), clock);
        self
    }

    pub fn with_calendar(mut self, calendar: WorkingCalendar) -> Self {
        self.estimator = QueueEstimator::new(calendar, self.estimator.clock().clone());
        self
    }

    /// Apply the calendar settings from `config`.
    ///
    /// # Errors
    /// `ValidationError` if the configured working window is invalid.
    pub fn with_config(self, config: &RegistrarConfig) -> Result<Self> {
        let calendar = WorkingCalendar::from_config(&config.calendar)?;
        Ok(self.with_calendar(calendar))
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: RegistrarMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn estimator(&self) -> &QueueEstimator {
        &self.estimator
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.estimator.clock().now()
    }

    // ------------------------------------------------------------------------
    // Student operations
    // ------------------------------------------------------------------------

    /// Submit a new request.
    ///
    /// The estimated completion is computed once, here, from the queue length
    /// before this request joins it.
    ///
    /// # Errors
    /// `ValidationError` if the student id, type label or semester is empty.
    #[tracing::instrument(skip(self, description))]
    pub async fn submit_request(
        &self,
        student_id: &str,
        request_type: &str,
        semester: &str,
        description: &str,
    ) -> Result<Request<Pending>> {
        for (field, value) in [
            ("student id", student_id),
            ("request type", request_type),
            ("semester", semester),
        ] {
            if value.trim().is_empty() {
                return Err(RegistrarError::ValidationError(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }

        let request_type = RequestType::from(request_type);
        let now = self.now();
        let queue_length = self.storage.count_pending(&request_type).await?;
        let estimated_completion = self
            .estimator
            .estimate_from(now, &request_type, queue_length);

        let request = Request {
            state: Pending {},
            data: RequestData {
                id: RequestId::from(uuid::Uuid::new_v4()),
                student_id: student_id.to_string(),
                request_type,
                semester: semester.to_string(),
                description: description.to_string(),
                created_at: now,
                estimated_completion,
            },
        };
        self.storage.insert_request(&request).await?;

        tracing::info!(
            request_id = %request.data.id,
            student_id = %request.data.student_id,
            queue_length,
            estimated_completion = %estimated_completion,
            "Request submitted"
        );

        let message = messages::submitted(&request.data.request_type);
        let email_body = messages::submitted_email(&request.data);
        self.notify(&request.data, message, Some(email_body)).await?;

        Ok(request)
    }

    /// Withdraw a pending request.
    #[tracing::instrument(skip(self), fields(request_id = %id))]
    pub async fn cancel_request(&self, id: RequestId) -> Result<Request<Canceled>> {
        let pending = self.load_pending(id).await?;
        let canceled = pending.cancel(self.storage.as_ref(), self.now()).await?;

        tracing::info!("Request canceled");

        let message =
            messages::status_changed(&canceled.data.request_type, RequestStatus::Canceled, None);
        self.notify(&canceled.data, message.clone(), Some(message))
            .await?;
        Ok(canceled)
    }

    // ------------------------------------------------------------------------
    // Admin operations
    // ------------------------------------------------------------------------

    /// Mark a pending request as handled. Records a notification but sends no email.
    #[tracing::instrument(skip(self), fields(request_id = %id))]
    pub async fn process_request(&self, id: RequestId) -> Result<Request<Processed>> {
        let pending = self.load_pending(id).await?;
        let processed = pending.process(self.storage.as_ref(), self.now()).await?;

        tracing::info!("Request processed");

        let message = messages::status_changed(
            &processed.data.request_type,
            RequestStatus::Processed,
            None,
        );
        self.notify(&processed.data, message, None).await?;
        Ok(processed)
    }

    /// Resolve or reject a request with an admin note.
    ///
    /// Pending requests move to Resolved/Rejected. Resolving a Resolved request
    /// (or rejecting a Rejected one) replaces the note. Any other starting
    /// status fails with `InvalidState`.
    #[tracing::instrument(skip(self, note), fields(request_id = %id, action = ?action))]
    pub async fn resolve_or_reject(
        &self,
        id: RequestId,
        action: ReviewAction,
        note: &str,
    ) -> Result<ReviewOutcome> {
        let current = match self.storage.get_request(id).await {
            Ok(request) => request,
            Err(e) if e.is_not_found() => {
                tracing::debug!("Request not found for review");
                return Ok(ReviewOutcome::NotFound(id));
            }
            Err(e) => return Err(e),
        };

        let storage = self.storage.as_ref();
        let now = self.now();
        let note = note.to_string();

        let updated: AnyRequest = match (current, action) {
            (AnyRequest::Pending(r), ReviewAction::Resolve) => {
                r.resolve(note, storage, now).await?.into()
            }
            (AnyRequest::Pending(r), ReviewAction::Reject) => {
                r.reject(note, storage, now).await?.into()
            }
            (AnyRequest::Resolved(r), ReviewAction::Resolve) => {
                r.resolve(note, storage, now).await?.into()
            }
            (AnyRequest::Rejected(r), ReviewAction::Reject) => {
                r.reject(note, storage, now).await?.into()
            }
            (other, action) => {
                let expected = match action {
                    ReviewAction::Resolve => "Pending or Resolved",
                    ReviewAction::Reject => "Pending or Rejected",
                };
                return Err(RegistrarError::InvalidState(
                    id,
                    other.status().label().to_string(),
                    expected.to_string(),
                ));
            }
        };

        tracing::info!(status = %updated.status(), "Request reviewed");

        let message =
            messages::status_changed(&updated.data().request_type, updated.status(), updated.note());
        self.notify(updated.data(), message.clone(), Some(message))
            .await?;
        Ok(ReviewOutcome::Applied(updated))
    }

    /// One pending request chosen uniformly at random across all types.
    #[tracing::instrument(skip(self))]
    pub async fn random_pending(&self) -> Result<Option<Request<Pending>>> {
        self.storage.random_pending().await
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// A student's requests, oldest first, optionally limited to one semester.
    #[tracing::instrument(skip(self))]
    pub async fn list_requests(
        &self,
        student_id: &str,
        semester: &SemesterFilter,
    ) -> Result<Vec<AnyRequest>> {
        self.storage.list_student_requests(student_id, semester).await
    }

    #[tracing::instrument(skip(self), fields(request_id = %id))]
    pub async fn get_request(&self, id: RequestId) -> Result<AnyRequest> {
        self.storage.get_request(id).await
    }

    /// Length and projected completion of each known queue.
    ///
    /// Counts are read fresh for every call.
    #[tracing::instrument(skip(self))]
    pub async fn queue_details(&self) -> Result<Vec<QueueDetail>> {
        let details = try_join_all(RequestType::known().into_iter().map(|request_type| async move {
            let queue_length = self.storage.count_pending(&request_type).await?;
            Ok::<_, RegistrarError>(self.estimator.detail(request_type, queue_length))
        }))
        .await?;

        self.observe_queues(&details);
        Ok(details)
    }

    /// The pending requests of one type in queue order.
    #[tracing::instrument(skip(self), fields(request_type = %request_type))]
    pub async fn queue_by_type(&self, request_type: &RequestType) -> Result<Vec<Request<Pending>>> {
        self.storage.list_pending_by_type(request_type).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn notifications(&self, student_id: &str) -> Result<Vec<Notification>> {
        self.storage.list_notifications(student_id).await
    }

    /// Delete every notification of a student. Returns how many were removed.
    #[tracing::instrument(skip(self))]
    pub async fn clear_notifications(&self, student_id: &str) -> Result<u64> {
        let removed = self.storage.delete_notifications(student_id).await?;
        tracing::debug!(removed, "Notifications cleared");
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn load_pending(&self, id: RequestId) -> Result<Request<Pending>> {
        let request = self.storage.get_request(id).await?;
        let status = request.status();
        request.into_pending().ok_or_else(|| {
            RegistrarError::InvalidState(
                id,
                status.label().to_string(),
                RequestStatus::Pending.label().to_string(),
            )
        })
    }

    /// Record the notification, then queue the email if there is one to send.
    async fn notify(
        &self,
        data: &RequestData,
        message: String,
        email_body: Option<String>,
    ) -> Result<()> {
        let notification = Notification::new(data.student_id.clone(), message, self.now());
        self.storage.insert_notification(&notification).await?;

        let Some(body) = email_body else {
            return Ok(());
        };

        match contact_email(self.storage.as_ref(), &data.student_id).await {
            Ok(Some(address)) => {
                self.outbox
                    .enqueue(Email::new(address, STATUS_UPDATE_SUBJECT, body));
            }
            Ok(None) => {
                tracing::debug!(
                    student_id = %data.student_id,
                    "No account record for student, skipping email"
                );
            }
            Err(e) => {
                tracing::warn!(
                    student_id = %data.student_id,
                    error = %e,
                    "Could not look up student email, skipping email"
                );
            }
        }
        Ok(())
    }

    #[cfg(feature = "metrics")]
    fn observe_queues(&self, details: &[QueueDetail]) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let now = self.now();
        for detail in details {
            metrics.set_queue(
                detail.request_type.as_str(),
                detail.queue_length,
                (detail.estimated_completion - now).num_minutes(),
            );
        }
    }

    #[cfg(not(feature = "metrics"))]
    fn observe_queues(&self, _details: &[QueueDetail]) {}
}

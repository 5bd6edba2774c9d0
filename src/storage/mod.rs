//! Storage traits for the request queue.
//!
//! This module defines the `Storage` and `AccountStorage` traits: the document
//! store collaborator that owns requests, notifications and student records.
//! The lifecycle manager holds no state of its own between calls; everything
//! goes through an injected implementation of these traits.

use async_trait::async_trait;

use crate::domain::notification::Notification;
use crate::domain::session::Session;
use crate::domain::student::{AccountRole, Student};
use crate::error::Result;
use crate::request::{
    AnyRequest, Pending, Request, RequestId, RequestState, RequestStatus, RequestType,
    SemesterFilter,
};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

/// Storage trait for persisting and querying requests and notifications.
///
/// The type system ensures valid state transitions, so implementations don't
/// need to validate them. They do have to honour the `expected` status passed
/// to [`Storage::persist`], which is what keeps transitions one-way under
/// concurrent admins.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Number of pending requests of one type, i.e. its queue length.
    async fn count_pending(&self, request_type: &RequestType) -> Result<u64>;

    /// Insert a newly submitted request.
    async fn insert_request(&self, request: &Request<Pending>) -> Result<()>;

    /// Write a request's new status (and note, if any).
    ///
    /// The update only applies while the stored status is still `expected`.
    ///
    /// # Errors
    /// - `RequestNotFound` if no request has this id
    /// - `InvalidState` if the stored status is no longer `expected`
    async fn persist<T: RequestState + Clone>(
        &self,
        request: &Request<T>,
        expected: RequestStatus,
    ) -> Result<()>
    where
        AnyRequest: From<Request<T>>;

    /// Get a request by id.
    async fn get_request(&self, id: RequestId) -> Result<AnyRequest>;

    /// All requests filed by a student, oldest first.
    async fn list_student_requests(
        &self,
        student_id: &str,
        semester: &SemesterFilter,
    ) -> Result<Vec<AnyRequest>>;

    /// The queue for one type: its pending requests, oldest first.
    async fn list_pending_by_type(&self, request_type: &RequestType)
    -> Result<Vec<Request<Pending>>>;

    /// One pending request chosen uniformly at random across all types.
    async fn random_pending(&self) -> Result<Option<Request<Pending>>>;

    async fn insert_notification(&self, notification: &Notification) -> Result<()>;

    /// A student's notifications in creation order.
    async fn list_notifications(&self, student_id: &str) -> Result<Vec<Notification>>;

    /// Delete all of a student's notifications, returning how many were removed.
    async fn delete_notifications(&self, student_id: &str) -> Result<u64>;
}

/// Account and session persistence.
///
/// Used by the account flows and by the lifecycle manager to find the address
/// a request's owner should be mailed at.
#[async_trait]
pub trait AccountStorage: Send + Sync {
    async fn count_students(&self) -> Result<u64>;

    /// Insert a new student.
    ///
    /// # Errors
    /// `ValidationError` if the id or email is already taken.
    async fn insert_student(&self, student: &Student) -> Result<()>;

    /// Replace a stored student record.
    ///
    /// # Errors
    /// `StudentNotFound` if no student has this id.
    async fn update_student(&self, student: &Student) -> Result<()>;

    async fn get_student(&self, student_id: &str) -> Result<Option<Student>>;

    async fn find_student_by_email(&self, email: &str) -> Result<Option<Student>>;

    async fn find_student_by_verification_token(&self, token: &str) -> Result<Option<Student>>;

    async fn find_student_by_reset_token(&self, token: &str) -> Result<Option<Student>>;

    /// Every account with `role`, in registration order.
    async fn list_students(&self, role: AccountRole) -> Result<Vec<Student>>;

    async fn insert_session(&self, session: &Session) -> Result<()>;

    /// The session stored under `key`, expired or not.
    async fn get_session(&self, key: &str) -> Result<Option<Session>>;

    /// Delete a session, returning whether it existed.
    async fn delete_session(&self, key: &str) -> Result<bool>;
}

//! In-memory implementation of the storage traits.
//!
//! Backs tests and single-process deployments. Requests and notifications are
//! kept in insertion order, which is also creation order since the lifecycle
//! manager stamps `created_at` immediately before inserting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::seq::IteratorRandom;

use super::{AccountStorage, Storage};
use crate::domain::notification::Notification;
use crate::domain::session::Session;
use crate::domain::student::{AccountRole, Student};
use crate::error::{RegistrarError, Result};
use crate::request::{
    AnyRequest, Pending, Request, RequestId, RequestState, RequestStatus, RequestType,
    SemesterFilter,
};

#[derive(Default)]
struct Tables {
    requests: Vec<AnyRequest>,
    notifications: Vec<Notification>,
    students: Vec<Student>,
    sessions: Vec<Session>,
}

/// Storage backed by process memory.
///
/// Cloning shares the same underlying tables.
///
/// # Example
/// ```ignore
/// let storage = Arc::new(InMemoryStorage::new());
/// let lifecycle = RequestLifecycle::new(storage.clone(), outbox);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
    status_writes_failing: Arc<AtomicBool>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreUnavailable` until switched back.
    ///
    /// Useful for exercising how callers surface storage outages.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make only [`Storage::persist`] fail with `StoreUnavailable`.
    ///
    /// Reads and inserts keep working, which isolates an outage that hits a
    /// transition after its request was loaded.
    pub fn set_status_writes_failing(&self, failing: bool) {
        self.status_writes_failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistrarError::StoreUnavailable(anyhow::anyhow!(
                "in-memory store marked unavailable"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn count_pending(&self, request_type: &RequestType) -> Result<u64> {
        self.check_available()?;
        let tables = self.tables.lock();
        let count = tables
            .requests
            .iter()
            .filter(|r| r.is_pending() && &r.data().request_type == request_type)
            .count();
        Ok(count as u64)
    }

    async fn insert_request(&self, request: &Request<Pending>) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.lock();
        if tables.requests.iter().any(|r| r.id() == request.data.id) {
            return Err(RegistrarError::ValidationError(format!(
                "request {} already exists",
                request.data.id
            )));
        }
        tables.requests.push(AnyRequest::from(request.clone()));
        Ok(())
    }

    async fn persist<T: RequestState + Clone>(
        &self,
        request: &Request<T>,
        expected: RequestStatus,
    ) -> Result<()>
    where
        AnyRequest: From<Request<T>>,
    {
        self.check_available()?;
        if self.status_writes_failing.load(Ordering::SeqCst) {
            return Err(RegistrarError::StoreUnavailable(anyhow::anyhow!(
                "in-memory store rejecting status writes"
            )));
        }
        let id = request.data.id;
        let mut tables = self.tables.lock();
        let slot = tables
            .requests
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or(RegistrarError::RequestNotFound(id))?;

        let actual = slot.status();
        if actual != expected {
            return Err(RegistrarError::InvalidState(
                id,
                actual.label().to_string(),
                expected.label().to_string(),
            ));
        }

        *slot = AnyRequest::from(request.clone());
        Ok(())
    }

    async fn get_request(&self, id: RequestId) -> Result<AnyRequest> {
        self.check_available()?;
        self.tables
            .lock()
            .requests
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .ok_or(RegistrarError::RequestNotFound(id))
    }

    async fn list_student_requests(
        &self,
        student_id: &str,
        semester: &SemesterFilter,
    ) -> Result<Vec<AnyRequest>> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .requests
            .iter()
            .filter(|r| r.data().student_id == student_id && semester.matches(&r.data().semester))
            .cloned()
            .collect())
    }

    async fn list_pending_by_type(
        &self,
        request_type: &RequestType,
    ) -> Result<Vec<Request<Pending>>> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .requests
            .iter()
            .filter_map(|r| r.as_pending())
            .filter(|r| &r.data.request_type == request_type)
            .cloned()
            .collect())
    }

    async fn random_pending(&self) -> Result<Option<Request<Pending>>> {
        self.check_available()?;
        let tables = self.tables.lock();
        let chosen = tables
            .requests
            .iter()
            .filter_map(|r| r.as_pending())
            .choose(&mut rand::thread_rng())
            .cloned();
        Ok(chosen)
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.check_available()?;
        self.tables.lock().notifications.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(&self, student_id: &str) -> Result<Vec<Notification>> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .notifications
            .iter()
            .filter(|n| n.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn delete_notifications(&self, student_id: &str) -> Result<u64> {
        self.check_available()?;
        let mut tables = self.tables.lock();
        let before = tables.notifications.len();
        tables.notifications.retain(|n| n.student_id != student_id);
        Ok((before - tables.notifications.len()) as u64)
    }
}

#[async_trait]
impl AccountStorage for InMemoryStorage {
    async fn count_students(&self) -> Result<u64> {
        self.check_available()?;
        Ok(self.tables.lock().students.len() as u64)
    }

    async fn insert_student(&self, student: &Student) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.lock();
        if tables
            .students
            .iter()
            .any(|s| s.id == student.id || s.email == student.email)
        {
            return Err(RegistrarError::ValidationError(format!(
                "student {} or email {} already registered",
                student.id, student.email
            )));
        }
        tables.students.push(student.clone());
        Ok(())
    }

    async fn update_student(&self, student: &Student) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.lock();
        let slot = tables
            .students
            .iter_mut()
            .find(|s| s.id == student.id)
            .ok_or_else(|| RegistrarError::StudentNotFound(student.id.clone()))?;
        *slot = student.clone();
        Ok(())
    }

    async fn get_student(&self, student_id: &str) -> Result<Option<Student>> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .students
            .iter()
            .find(|s| s.id == student_id)
            .cloned())
    }

    async fn find_student_by_email(&self, email: &str) -> Result<Option<Student>> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .students
            .iter()
            .find(|s| s.email == email)
            .cloned())
    }

    async fn find_student_by_verification_token(&self, token: &str) -> Result<Option<Student>> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .students
            .iter()
            .find(|s| s.verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_student_by_reset_token(&self, token: &str) -> Result<Option<Student>> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .students
            .iter()
            .find(|s| s.reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn list_students(&self, role: AccountRole) -> Result<Vec<Student>> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .students
            .iter()
            .filter(|s| s.role == role)
            .cloned()
            .collect())
    }

    async fn insert_session(&self, session: &Session) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.lock();
        if tables.sessions.iter().any(|s| s.key == session.key) {
            return Err(RegistrarError::ValidationError(format!(
                "session {} already exists",
                session.key
            )));
        }
        tables.sessions.push(session.clone());
        Ok(())
    }

    async fn get_session(&self, key: &str) -> Result<Option<Session>> {
        self.check_available()?;
        Ok(self
            .tables
            .lock()
            .sessions
            .iter()
            .find(|s| s.key == key)
            .cloned())
    }

    async fn delete_session(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        let mut tables = self.tables.lock();
        let before = tables.sessions.len();
        tables.sessions.retain(|s| s.key != key);
        Ok(tables.sessions.len() < before)
    }
}

//! PostgreSQL implementation of the storage traits.
//!
//! Requests, notifications and students live in the tables created by
//! `migrations/`. Listings are ordered by the `seq` column, which follows
//! insertion order. Status updates are single conditional `UPDATE`s, so a
//! concurrent transition on the same request cannot be silently overwritten.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AccountStorage, Storage};
use crate::domain::notification::{Notification, NotificationId};
use crate::domain::session::Session;
use crate::domain::student::{AccountRole, Student};
use crate::error::{RegistrarError, Result};
use crate::request::{
    AnyRequest, Pending, Request, RequestData, RequestId, RequestState, RequestStatus,
    RequestType, SemesterFilter,
};

pub mod pool_provider;

pub use pool_provider::{PoolProvider, TestDbPools};

const REQUEST_COLUMNS: &str = "id, student_id, request_type, semester, description, status, \
     note, created_at, estimated_completion, status_changed_at";

const STUDENT_COLUMNS: &str = "id, email, phone, role, verified, verification_token, \
     reset_token, reset_token_issued_at, registered_at";

/// PostgreSQL-backed [`Storage`] and [`AccountStorage`].
///
/// # Example
/// ```ignore
/// let pool = PgPool::connect("postgresql://localhost/registrar").await?;
/// registrar::migrator().run(&pool).await?;
/// let storage = Arc::new(PostgresStorage::new(pool));
/// ```
#[derive(Clone)]
pub struct PostgresStorage<P: PoolProvider = sqlx::PgPool> {
    pools: P,
}

impl<P: PoolProvider> PostgresStorage<P> {
    pub fn new(pools: P) -> Self {
        Self { pools }
    }

    pub fn pools(&self) -> &P {
        &self.pools
    }
}

fn store_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> RegistrarError {
    move |e| RegistrarError::StoreUnavailable(anyhow!("{}: {}", context, e))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: Uuid,
    student_id: String,
    request_type: String,
    semester: String,
    description: String,
    status: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
    estimated_completion: DateTime<Utc>,
    status_changed_at: Option<DateTime<Utc>>,
}

impl RequestRow {
    fn into_request(self) -> Result<AnyRequest> {
        let status: RequestStatus = self.status.parse().map_err(|e| {
            RegistrarError::Other(anyhow!("request {} has a corrupt status: {}", self.id, e))
        })?;
        let data = RequestData {
            id: RequestId::from(self.id),
            student_id: self.student_id,
            request_type: RequestType::from(self.request_type),
            semester: self.semester,
            description: self.description,
            created_at: self.created_at,
            estimated_completion: self.estimated_completion,
        };
        Ok(AnyRequest::from_parts(
            data,
            status,
            self.note,
            self.status_changed_at,
        ))
    }

    fn into_pending(self) -> Result<Request<Pending>> {
        let id = self.id;
        self.into_request()?.into_pending().ok_or_else(|| {
            RegistrarError::Other(anyhow!("request {} is no longer pending", id))
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    student_id: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Notification {
            id: NotificationId::from(row.id),
            student_id: row.student_id,
            message: row.message,
            created_at: row.created_at,
        }
    }
}

fn parse_role(owner: &str, role: &str) -> Result<AccountRole> {
    role.parse().map_err(|e| {
        RegistrarError::Other(anyhow!("account {} has a corrupt role: {}", owner, e))
    })
}

#[derive(sqlx::FromRow)]
struct StudentRow {
    id: String,
    email: String,
    phone: Option<String>,
    role: String,
    verified: bool,
    verification_token: Option<String>,
    reset_token: Option<String>,
    reset_token_issued_at: Option<DateTime<Utc>>,
    registered_at: DateTime<Utc>,
}

impl TryFrom<StudentRow> for Student {
    type Error = RegistrarError;

    fn try_from(row: StudentRow) -> Result<Self> {
        let role = parse_role(&row.id, &row.role)?;
        Ok(Student {
            id: row.id,
            email: row.email,
            phone: row.phone,
            role,
            verified: row.verified,
            verification_token: row.verification_token,
            reset_token: row.reset_token,
            reset_token_issued_at: row.reset_token_issued_at,
            registered_at: row.registered_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_key: String,
    student_id: String,
    role: String,
    expires_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = RegistrarError;

    fn try_from(row: SessionRow) -> Result<Self> {
        let role = parse_role(&row.student_id, &row.role)?;
        Ok(Session {
            key: row.session_key,
            student_id: row.student_id,
            role,
            expires_at: row.expires_at,
        })
    }
}

#[async_trait]
impl<P: PoolProvider> Storage for PostgresStorage<P> {
    #[tracing::instrument(skip(self), fields(request_type = %request_type))]
    async fn count_pending(&self, request_type: &RequestType) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM requests WHERE request_type = $1 AND status = 'pending'",
        )
        .bind(request_type.as_str())
        .fetch_one(self.pools.read())
        .await
        .map_err(store_err("Failed to count pending requests"))?;
        Ok(count.max(0) as u64)
    }

    #[tracing::instrument(skip(self, request), fields(request_id = %request.data.id))]
    async fn insert_request(&self, request: &Request<Pending>) -> Result<()> {
        let data = &request.data;
        sqlx::query(
            r#"
            INSERT INTO requests (
                id, student_id, request_type, semester, description, status,
                created_at, estimated_completion
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
            "#,
        )
        .bind(*data.id)
        .bind(&data.student_id)
        .bind(data.request_type.as_str())
        .bind(&data.semester)
        .bind(&data.description)
        .bind(data.created_at)
        .bind(data.estimated_completion)
        .execute(self.pools.write())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegistrarError::ValidationError(format!("request {} already exists", data.id))
            } else {
                store_err("Failed to insert request")(e)
            }
        })?;
        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(request_id = %request.data.id, to = T::STATUS.as_str(), expected = expected.as_str()))]
    async fn persist<T: RequestState + Clone>(
        &self,
        request: &Request<T>,
        expected: RequestStatus,
    ) -> Result<()>
    where
        AnyRequest: From<Request<T>>,
    {
        let id = request.data.id;
        let any = AnyRequest::from(request.clone());

        let result = sqlx::query(
            r#"
            UPDATE requests
            SET status = $2, note = $3, status_changed_at = $4
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(*id)
        .bind(any.status().as_str())
        .bind(any.note())
        .bind(any.status_changed_at())
        .bind(expected.as_str())
        .execute(self.pools.write())
        .await
        .map_err(store_err("Failed to update request"))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Nothing matched: either the request is gone or someone moved it first.
        let current: Option<(String,)> = sqlx::query_as("SELECT status FROM requests WHERE id = $1")
            .bind(*id)
            .fetch_optional(self.pools.write())
            .await
            .map_err(store_err("Failed to read request status"))?;

        match current {
            None => Err(RegistrarError::RequestNotFound(id)),
            Some((actual,)) => {
                let actual = actual
                    .parse::<RequestStatus>()
                    .map(|s| s.label().to_string())
                    .unwrap_or(actual);
                tracing::debug!(actual = %actual, "Conditional update lost the race");
                Err(RegistrarError::InvalidState(
                    id,
                    actual,
                    expected.label().to_string(),
                ))
            }
        }
    }

    #[tracing::instrument(skip(self), fields(request_id = %id))]
    async fn get_request(&self, id: RequestId) -> Result<AnyRequest> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM requests WHERE id = $1",
            REQUEST_COLUMNS
        ))
        .bind(*id)
        .fetch_optional(self.pools.read())
        .await
        .map_err(store_err("Failed to fetch request"))?;

        row.ok_or(RegistrarError::RequestNotFound(id))?
            .into_request()
    }

    #[tracing::instrument(skip(self, semester), fields(semester = ?semester))]
    async fn list_student_requests(
        &self,
        student_id: &str,
        semester: &SemesterFilter,
    ) -> Result<Vec<AnyRequest>> {
        let semester = match semester {
            SemesterFilter::All => None,
            SemesterFilter::Only(label) => Some(label.as_str()),
        };
        let rows: Vec<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM requests \
             WHERE student_id = $1 AND ($2::TEXT IS NULL OR semester = $2) \
             ORDER BY seq",
            REQUEST_COLUMNS
        ))
        .bind(student_id)
        .bind(semester)
        .fetch_all(self.pools.read())
        .await
        .map_err(store_err("Failed to list student requests"))?;

        rows.into_iter().map(RequestRow::into_request).collect()
    }

    #[tracing::instrument(skip(self), fields(request_type = %request_type))]
    async fn list_pending_by_type(
        &self,
        request_type: &RequestType,
    ) -> Result<Vec<Request<Pending>>> {
        let rows: Vec<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM requests \
             WHERE request_type = $1 AND status = 'pending' \
             ORDER BY created_at, seq",
            REQUEST_COLUMNS
        ))
        .bind(request_type.as_str())
        .fetch_all(self.pools.read())
        .await
        .map_err(store_err("Failed to list queue"))?;

        rows.into_iter().map(RequestRow::into_pending).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn random_pending(&self) -> Result<Option<Request<Pending>>> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM requests WHERE status = 'pending' ORDER BY random() LIMIT 1",
            REQUEST_COLUMNS
        ))
        .fetch_optional(self.pools.read())
        .await
        .map_err(store_err("Failed to pick a pending request"))?;

        row.map(RequestRow::into_pending).transpose()
    }

    #[tracing::instrument(skip(self, notification), fields(student_id = %notification.student_id))]
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications (id, student_id, message, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(notification.id.0)
        .bind(&notification.student_id)
        .bind(&notification.message)
        .bind(notification.created_at)
        .execute(self.pools.write())
        .await
        .map_err(store_err("Failed to insert notification"))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_notifications(&self, student_id: &str) -> Result<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            "SELECT id, student_id, message, created_at FROM notifications \
             WHERE student_id = $1 ORDER BY seq",
        )
        .bind(student_id)
        .fetch_all(self.pools.read())
        .await
        .map_err(store_err("Failed to list notifications"))?;

        Ok(rows.into_iter().map(Notification::from).collect())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_notifications(&self, student_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE student_id = $1")
            .bind(student_id)
            .execute(self.pools.write())
            .await
            .map_err(store_err("Failed to delete notifications"))?;
        Ok(result.rows_affected())
    }
}

impl<P: PoolProvider> PostgresStorage<P> {
    async fn find_student_where(&self, column: &'static str, value: &str) -> Result<Option<Student>> {
        let row: Option<StudentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM students WHERE {} = $1",
            STUDENT_COLUMNS, column
        ))
        .bind(value)
        .fetch_optional(self.pools.read())
        .await
        .map_err(store_err("Failed to fetch student"))?;
        row.map(Student::try_from).transpose()
    }
}

#[async_trait]
impl<P: PoolProvider> AccountStorage for PostgresStorage<P> {
    async fn count_students(&self) -> Result<u64> {
        // Ids are derived from this count, so read from the primary.
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM students")
            .fetch_one(self.pools.write())
            .await
            .map_err(store_err("Failed to count students"))?;
        Ok(count.max(0) as u64)
    }

    #[tracing::instrument(skip(self, student), fields(student_id = %student.id))]
    async fn insert_student(&self, student: &Student) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO students ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            STUDENT_COLUMNS
        ))
        .bind(&student.id)
        .bind(&student.email)
        .bind(&student.phone)
        .bind(student.role.as_str())
        .bind(student.verified)
        .bind(&student.verification_token)
        .bind(&student.reset_token)
        .bind(student.reset_token_issued_at)
        .bind(student.registered_at)
        .execute(self.pools.write())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegistrarError::ValidationError(format!(
                    "student {} or email {} already registered",
                    student.id, student.email
                ))
            } else {
                store_err("Failed to insert student")(e)
            }
        })?;
        Ok(())
    }

    #[tracing::instrument(skip(self, student), fields(student_id = %student.id))]
    async fn update_student(&self, student: &Student) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE students
            SET email = $2, phone = $3, role = $4, verified = $5,
                verification_token = $6, reset_token = $7, reset_token_issued_at = $8
            WHERE id = $1
            "#,
        )
        .bind(&student.id)
        .bind(&student.email)
        .bind(&student.phone)
        .bind(student.role.as_str())
        .bind(student.verified)
        .bind(&student.verification_token)
        .bind(&student.reset_token)
        .bind(student.reset_token_issued_at)
        .execute(self.pools.write())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegistrarError::ValidationError(format!(
                    "email {} is already registered",
                    student.email
                ))
            } else {
                store_err("Failed to update student")(e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(RegistrarError::StudentNotFound(student.id.clone()));
        }
        Ok(())
    }

    async fn get_student(&self, student_id: &str) -> Result<Option<Student>> {
        self.find_student_where("id", student_id).await
    }

    async fn find_student_by_email(&self, email: &str) -> Result<Option<Student>> {
        self.find_student_where("email", email).await
    }

    async fn find_student_by_verification_token(&self, token: &str) -> Result<Option<Student>> {
        self.find_student_where("verification_token", token).await
    }

    async fn find_student_by_reset_token(&self, token: &str) -> Result<Option<Student>> {
        self.find_student_where("reset_token", token).await
    }

    #[tracing::instrument(skip(self), fields(role = %role))]
    async fn list_students(&self, role: AccountRole) -> Result<Vec<Student>> {
        let rows: Vec<StudentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM students WHERE role = $1 ORDER BY seq",
            STUDENT_COLUMNS
        ))
        .bind(role.as_str())
        .fetch_all(self.pools.read())
        .await
        .map_err(store_err("Failed to list accounts"))?;

        rows.into_iter().map(Student::try_from).collect()
    }

    #[tracing::instrument(skip(self, session), fields(student_id = %session.student_id))]
    async fn insert_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (session_key, student_id, role, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&session.key)
        .bind(&session.student_id)
        .bind(session.role.as_str())
        .bind(session.expires_at)
        .execute(self.pools.write())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RegistrarError::ValidationError(format!("session {} already exists", session.key))
            } else {
                store_err("Failed to insert session")(e)
            }
        })?;
        Ok(())
    }

    async fn get_session(&self, key: &str) -> Result<Option<Session>> {
        // Sessions are read right after login, so skip the replica.
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT session_key, student_id, role, expires_at FROM sessions WHERE session_key = $1",
        )
        .bind(key)
        .fetch_optional(self.pools.write())
        .await
        .map_err(store_err("Failed to fetch session"))?;

        row.map(Session::try_from).transpose()
    }

    async fn delete_session(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_key = $1")
            .bind(key)
            .execute(self.pools.write())
            .await
            .map_err(store_err("Failed to delete session"))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn pending(student_id: &str, request_type: RequestType, created_at: DateTime<Utc>) -> Request<Pending> {
        Request {
            state: Pending {},
            data: RequestData {
                id: RequestId::from(Uuid::new_v4()),
                student_id: student_id.to_string(),
                request_type,
                semester: "Fall 2025".to_string(),
                description: "Official copy".to_string(),
                created_at,
                estimated_completion: created_at,
            },
        }
    }

    fn monday_nine() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
    }

    #[sqlx::test]
    async fn test_insert_and_get_request(pool: sqlx::PgPool) {
        let storage = PostgresStorage::new(TestDbPools::new(pool).await.unwrap());
        let request = pending("60001", RequestType::Other("Locker".to_string()), monday_nine());
        storage.insert_request(&request).await.unwrap();

        let stored = storage.get_request(request.data.id).await.unwrap();
        assert!(stored.is_pending());
        assert_eq!(stored.data(), &request.data);

        let missing = storage.get_request(RequestId::from(Uuid::new_v4())).await;
        assert!(matches!(missing, Err(RegistrarError::RequestNotFound(_))));
    }

    #[sqlx::test]
    async fn test_count_and_queue_order(pool: sqlx::PgPool) {
        let storage = PostgresStorage::new(TestDbPools::new(pool).await.unwrap());
        let first = pending("60001", RequestType::Transcript, monday_nine());
        let second = pending("60002", RequestType::Transcript, monday_nine() + Duration::minutes(1));
        let appeal = pending("60002", RequestType::GradeAppeal, monday_nine());
        for r in [&first, &second, &appeal] {
            storage.insert_request(r).await.unwrap();
        }

        assert_eq!(storage.count_pending(&RequestType::Transcript).await.unwrap(), 2);
        let queue = storage
            .list_pending_by_type(&RequestType::Transcript)
            .await
            .unwrap();
        let ids: Vec<_> = queue.iter().map(|r| r.data.id).collect();
        assert_eq!(ids, vec![first.data.id, second.data.id]);

        first.process(&storage, monday_nine()).await.unwrap();
        assert_eq!(storage.count_pending(&RequestType::Transcript).await.unwrap(), 1);
    }

    #[sqlx::test]
    async fn test_conditional_update(pool: sqlx::PgPool) {
        let storage = PostgresStorage::new(TestDbPools::new(pool).await.unwrap());
        let request = pending("60001", RequestType::GradeAppeal, monday_nine());
        let id = request.data.id;
        storage.insert_request(&request).await.unwrap();

        let resolved = request
            .clone()
            .resolve("Grade corrected".to_string(), &storage, monday_nine())
            .await
            .unwrap();

        // A stale pending handle cannot overwrite the decision.
        let stale = request.cancel(&storage, monday_nine()).await;
        assert!(matches!(
            stale,
            Err(RegistrarError::InvalidState(_, ref actual, _)) if actual == "Resolved"
        ));

        resolved
            .resolve("Grade corrected to B+".to_string(), &storage, monday_nine())
            .await
            .unwrap();
        let stored = storage.get_request(id).await.unwrap();
        assert_eq!(stored.note(), Some("Grade corrected to B+"));
        assert_eq!(stored.status_changed_at(), Some(monday_nine()));
    }

    #[sqlx::test]
    async fn test_persist_missing_request(pool: sqlx::PgPool) {
        let storage = PostgresStorage::new(pool);
        let request = pending("60001", RequestType::Transcript, monday_nine());
        let result = request.cancel(&storage, monday_nine()).await;
        assert!(matches!(result, Err(RegistrarError::RequestNotFound(_))));
    }

    #[sqlx::test]
    async fn test_semester_filter_and_random_pending(pool: sqlx::PgPool) {
        let storage = PostgresStorage::new(TestDbPools::new(pool).await.unwrap());
        assert!(storage.random_pending().await.unwrap().is_none());

        let mut spring = pending("60001", RequestType::Transcript, monday_nine());
        spring.data.semester = "Spring 2025".to_string();
        let fall = pending("60001", RequestType::EnrollmentLetter, monday_nine());
        storage.insert_request(&spring).await.unwrap();
        storage.insert_request(&fall).await.unwrap();

        let all = storage
            .list_student_requests("60001", &SemesterFilter::All)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        let only_spring = storage
            .list_student_requests("60001", &SemesterFilter::from("Spring 2025"))
            .await
            .unwrap();
        assert_eq!(only_spring.len(), 1);
        assert_eq!(only_spring[0].id(), spring.data.id);

        spring.cancel(&storage, monday_nine()).await.unwrap();
        let picked = storage.random_pending().await.unwrap().unwrap();
        assert_eq!(picked.data.id, fall.data.id);
    }

    #[sqlx::test]
    async fn test_notifications_in_creation_order(pool: sqlx::PgPool) {
        let storage = PostgresStorage::new(TestDbPools::new(pool).await.unwrap());
        for message in ["submitted", "canceled"] {
            storage
                .insert_notification(&Notification::new("60001", message, monday_nine()))
                .await
                .unwrap();
        }
        storage
            .insert_notification(&Notification::new("60002", "other", monday_nine()))
            .await
            .unwrap();

        let messages: Vec<String> = storage
            .list_notifications("60001")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.message)
            .collect();
        assert_eq!(messages, vec!["submitted", "canceled"]);

        assert_eq!(storage.delete_notifications("60001").await.unwrap(), 2);
        assert_eq!(storage.list_notifications("60002").await.unwrap().len(), 1);
    }

    #[sqlx::test]
    async fn test_student_records(pool: sqlx::PgPool) {
        let storage = PostgresStorage::new(TestDbPools::new(pool).await.unwrap());
        let mut student = Student {
            id: Student::next_id(0),
            email: "amira@example.edu".to_string(),
            phone: None,
            role: AccountRole::Student,
            verified: false,
            verification_token: Some("abc123".to_string()),
            reset_token: None,
            reset_token_issued_at: None,
            registered_at: monday_nine(),
        };
        storage.insert_student(&student).await.unwrap();
        assert_eq!(storage.count_students().await.unwrap(), 1);
        assert!(matches!(
            storage.insert_student(&student).await,
            Err(RegistrarError::ValidationError(_))
        ));

        let found = storage
            .find_student_by_verification_token("abc123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "60001");

        student.verified = true;
        student.verification_token = None;
        student.reset_token = Some("042917".to_string());
        student.reset_token_issued_at = Some(monday_nine());
        storage.update_student(&student).await.unwrap();

        let by_reset = storage
            .find_student_by_reset_token("042917")
            .await
            .unwrap()
            .unwrap();
        assert!(by_reset.verified);
        assert!(
            storage
                .find_student_by_verification_token("abc123")
                .await
                .unwrap()
                .is_none()
        );

        student.id = "60999".to_string();
        assert!(matches!(
            storage.update_student(&student).await,
            Err(RegistrarError::StudentNotFound(_))
        ));
    }

    #[sqlx::test]
    async fn test_contact_update_and_role_listing(pool: sqlx::PgPool) {
        let storage = PostgresStorage::new(TestDbPools::new(pool).await.unwrap());
        let account = |n: u64, email: &str, role: AccountRole| Student {
            id: Student::next_id(n),
            email: email.to_string(),
            phone: None,
            role,
            verified: true,
            verification_token: None,
            reset_token: None,
            reset_token_issued_at: None,
            registered_at: monday_nine(),
        };
        let mut amira = account(0, "amira@example.edu", AccountRole::Student);
        storage.insert_student(&amira).await.unwrap();
        storage
            .insert_student(&account(1, "dean@example.edu", AccountRole::Manager))
            .await
            .unwrap();
        storage
            .insert_student(&account(2, "jon@example.edu", AccountRole::Student))
            .await
            .unwrap();

        let students: Vec<String> = storage
            .list_students(AccountRole::Student)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(students, vec!["60001", "60003"]);
        assert_eq!(storage.list_students(AccountRole::Manager).await.unwrap().len(), 1);

        amira.phone = Some("555-0100".to_string());
        storage.update_student(&amira).await.unwrap();
        let stored = storage.get_student("60001").await.unwrap().unwrap();
        assert_eq!(stored.phone.as_deref(), Some("555-0100"));

        amira.email = "jon@example.edu".to_string();
        assert!(matches!(
            storage.update_student(&amira).await,
            Err(RegistrarError::ValidationError(_))
        ));
    }

    #[sqlx::test]
    async fn test_sessions(pool: sqlx::PgPool) {
        let storage = PostgresStorage::new(TestDbPools::new(pool).await.unwrap());
        let session = Session::new("60002", AccountRole::Manager, monday_nine());
        storage.insert_session(&session).await.unwrap();

        let stored = storage.get_session(&session.key).await.unwrap().unwrap();
        assert_eq!(stored, session);

        assert!(storage.delete_session(&session.key).await.unwrap());
        assert!(storage.get_session(&session.key).await.unwrap().is_none());
        assert!(!storage.delete_session(&session.key).await.unwrap());
    }
}

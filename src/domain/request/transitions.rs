//! State transitions for service requests using the typestate pattern.
//!
//! ```text
//! Request<Pending> ──process()──> Request<Processed>
//!       │
//!       ├──resolve(note)──> Request<Resolved> ──resolve(note)──> Request<Resolved>
//!       ├──reject(note)───> Request<Rejected> ──reject(note)───> Request<Rejected>
//!       └──cancel()───────> Request<Canceled>
//! ```
//!
//! Every status other than Pending is terminal. The only outgoing edges from a
//! terminal status are the re-annotation loops on Resolved and Rejected, which
//! overwrite the note and keep the status.
//!
//! Each transition persists the new state before returning it. The write is
//! conditional on the previous status, so two admins acting on the same request
//! cannot silently overwrite each other: the loser gets
//! [`RegistrarError::InvalidState`](crate::error::RegistrarError::InvalidState).

use chrono::{DateTime, Utc};
use metrics::counter;

use crate::error::Result;
use crate::storage::Storage;

use super::state::{
    Canceled, Pending, Processed, Rejected, Request, RequestState, RequestStatus, Resolved,
};

fn record_transition<T: RequestState>(from: RequestStatus) {
    counter!(
        "registrar_request_transitions_total",
        "from" => from.as_str(),
        "to" => T::STATUS.as_str()
    )
    .increment(1);
}

impl Request<Pending> {
    pub async fn process<S: Storage + ?Sized>(
        self,
        storage: &S,
        now: DateTime<Utc>,
    ) -> Result<Request<Processed>> {
        let request = Request {
            data: self.data,
            state: Processed { processed_at: now },
        };
        storage.persist(&request, RequestStatus::Pending).await?;
        record_transition::<Processed>(RequestStatus::Pending);
        Ok(request)
    }

    pub async fn resolve<S: Storage + ?Sized>(
        self,
        note: String,
        storage: &S,
        now: DateTime<Utc>,
    ) -> Result<Request<Resolved>> {
        let request = Request {
            data: self.data,
            state: Resolved {
                note,
                resolved_at: now,
            },
        };
        storage.persist(&request, RequestStatus::Pending).await?;
        record_transition::<Resolved>(RequestStatus::Pending);
        Ok(request)
    }

    pub async fn reject<S: Storage + ?Sized>(
        self,
        note: String,
        storage: &S,
        now: DateTime<Utc>,
    ) -> Result<Request<Rejected>> {
        let request = Request {
            data: self.data,
            state: Rejected {
                note,
                rejected_at: now,
            },
        };
        storage.persist(&request, RequestStatus::Pending).await?;
        record_transition::<Rejected>(RequestStatus::Pending);
        Ok(request)
    }

    pub async fn cancel<S: Storage + ?Sized>(
        self,
        storage: &S,
        now: DateTime<Utc>,
    ) -> Result<Request<Canceled>> {
        let request = Request {
            data: self.data,
            state: Canceled { canceled_at: now },
        };
        storage.persist(&request, RequestStatus::Pending).await?;
        record_transition::<Canceled>(RequestStatus::Pending);
        Ok(request)
    }
}

impl Request<Resolved> {
    /// Resolve again, replacing the note. The status stays Resolved.
    pub async fn resolve<S: Storage + ?Sized>(
        self,
        note: String,
        storage: &S,
        now: DateTime<Utc>,
    ) -> Result<Request<Resolved>> {
        tracing::debug!(
            request_id = %self.data.id,
            previous_note = %self.state.note,
            "Overwriting note on resolved request"
        );
        let request = Request {
            data: self.data,
            state: Resolved {
                note,
                resolved_at: now,
            },
        };
        storage.persist(&request, RequestStatus::Resolved).await?;
        record_transition::<Resolved>(RequestStatus::Resolved);
        Ok(request)
    }
}

impl Request<Rejected> {
    /// Reject again, replacing the note. The status stays Rejected.
    pub async fn reject<S: Storage + ?Sized>(
        self,
        note: String,
        storage: &S,
        now: DateTime<Utc>,
    ) -> Result<Request<Rejected>> {
        tracing::debug!(
            request_id = %self.data.id,
            previous_note = %self.state.note,
            "Overwriting note on rejected request"
        );
        let request = Request {
            data: self.data,
            state: Rejected {
                note,
                rejected_at: now,
            },
        };
        storage.persist(&request, RequestStatus::Rejected).await?;
        record_transition::<Rejected>(RequestStatus::Rejected);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;
    use crate::domain::request::state::{AnyRequest, RequestData, RequestId, RequestType};
    use crate::error::RegistrarError;
    use crate::storage::memory::InMemoryStorage;

    fn pending_request(now: DateTime<Utc>) -> Request<Pending> {
        Request {
            state: Pending {},
            data: RequestData {
                id: RequestId::from(Uuid::new_v4()),
                student_id: "60001".to_string(),
                request_type: RequestType::Transcript,
                semester: "Fall 2025".to_string(),
                description: "Official copy".to_string(),
                created_at: now,
                estimated_completion: now,
            },
        }
    }

    #[tokio::test]
    async fn test_pending_to_processed_persists() {
        let storage = InMemoryStorage::new();
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
        let request = pending_request(now);
        let id = request.data.id;
        storage.insert_request(&request).await.unwrap();

        let processed = request.process(&storage, now).await.unwrap();
        assert_eq!(processed.state.processed_at, now);

        let stored = storage.get_request(id).await.unwrap();
        assert!(matches!(stored, AnyRequest::Processed(_)));
    }

    #[tokio::test]
    async fn test_resolve_twice_overwrites_note() {
        let storage = InMemoryStorage::new();
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
        let request = pending_request(now);
        let id = request.data.id;
        storage.insert_request(&request).await.unwrap();

        let resolved = request
            .resolve("approved".to_string(), &storage, now)
            .await
            .unwrap();
        resolved
            .resolve("approved, copy mailed".to_string(), &storage, now)
            .await
            .unwrap();

        let stored = storage.get_request(id).await.unwrap();
        assert_eq!(stored.note(), Some("approved, copy mailed"));
    }

    #[tokio::test]
    async fn test_stale_pending_handle_is_rejected() {
        let storage = InMemoryStorage::new();
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
        let request = pending_request(now);
        storage.insert_request(&request).await.unwrap();

        // Two admins load the same pending request; the second write loses.
        let first = request.clone();
        first.cancel(&storage, now).await.unwrap();

        let result = request.process(&storage, now).await;
        assert!(matches!(result, Err(RegistrarError::InvalidState(..))));
    }
}

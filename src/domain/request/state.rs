//! Core request types.
//!
//! Requests use the typestate pattern: the status of a request is a type
//! parameter, so only the transitions that are legal for that status can be
//! called on it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RegistrarError;

/// Processing time per request for types without a dedicated budget.
pub const DEFAULT_PROCESSING_MINUTES: u32 = 15;

/// The kind of service a student asks for.
///
/// The three known types each have their own queue and processing budget.
/// Anything else lands in `Other`, which keeps its label and uses
/// [`DEFAULT_PROCESSING_MINUTES`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestType {
    Transcript,
    EnrollmentLetter,
    GradeAppeal,
    Other(String),
}

impl RequestType {
    /// The types that have a dedicated queue, in display order.
    pub fn known() -> [RequestType; 3] {
        [
            RequestType::Transcript,
            RequestType::EnrollmentLetter,
            RequestType::GradeAppeal,
        ]
    }

    /// Minutes of working time an admin spends on one request of this type.
    pub fn processing_minutes(&self) -> u32 {
        match self {
            RequestType::Transcript => 15,
            RequestType::EnrollmentLetter => 20,
            RequestType::GradeAppeal => 30,
            RequestType::Other(_) => DEFAULT_PROCESSING_MINUTES,
        }
    }

    /// The label stored and shown for this type.
    pub fn as_str(&self) -> &str {
        match self {
            RequestType::Transcript => "Transcript",
            RequestType::EnrollmentLetter => "Enrollment Letter",
            RequestType::GradeAppeal => "Grade Appeal",
            RequestType::Other(label) => label,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for RequestType {
    fn from(label: &str) -> Self {
        match label {
            "Transcript" => RequestType::Transcript,
            "Enrollment Letter" => RequestType::EnrollmentLetter,
            "Grade Appeal" => RequestType::GradeAppeal,
            other => RequestType::Other(other.to_string()),
        }
    }
}

impl From<String> for RequestType {
    fn from(label: String) -> Self {
        RequestType::from(label.as_str())
    }
}

impl From<RequestType> for String {
    fn from(request_type: RequestType) -> Self {
        request_type.as_str().to_string()
    }
}

/// Status of a request as stored and filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processed,
    Resolved,
    Rejected,
    Canceled,
}

impl RequestStatus {
    /// Lower-case form used in storage and in notification text.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processed => "processed",
            RequestStatus::Resolved => "resolved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Canceled => "canceled",
        }
    }

    /// Capitalised form shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "Pending",
            RequestStatus::Processed => "Processed",
            RequestStatus::Resolved => "Resolved",
            RequestStatus::Rejected => "Rejected",
            RequestStatus::Canceled => "Canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RequestStatus {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "processed" => Ok(RequestStatus::Processed),
            "resolved" => Ok(RequestStatus::Resolved),
            "rejected" => Ok(RequestStatus::Rejected),
            "canceled" => Ok(RequestStatus::Canceled),
            other => Err(RegistrarError::ValidationError(format!(
                "unknown request status '{}'",
                other
            ))),
        }
    }
}

/// Filter for listing a student's requests by semester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemesterFilter {
    /// Every semester.
    All,
    /// Exact match on the semester label.
    Only(String),
}

impl SemesterFilter {
    pub fn matches(&self, semester: &str) -> bool {
        match self {
            SemesterFilter::All => true,
            SemesterFilter::Only(wanted) => wanted == semester,
        }
    }
}

impl From<&str> for SemesterFilter {
    /// `"all"` is the no-filter sentinel used by the student request listing.
    fn from(value: &str) -> Self {
        if value == "all" {
            SemesterFilter::All
        } else {
            SemesterFilter::Only(value.to_string())
        }
    }
}

/// Marker trait for valid request states.
pub trait RequestState: Send + Sync {
    const STATUS: RequestStatus;
}

/// A service request submitted by a student.
///
/// The generic parameter `T` is the current state of the request.
#[derive(Debug, Clone, Serialize)]
pub struct Request<T: RequestState> {
    /// The current state of the request.
    pub state: T,
    /// Data fixed at submission time.
    pub data: RequestData,
}

/// Data captured when a request is submitted. Never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestData {
    pub id: RequestId,

    /// Owner of the request.
    pub student_id: String,

    pub request_type: RequestType,

    /// Free-text semester label, e.g. "Fall 2025".
    pub semester: String,

    pub description: String,

    pub created_at: DateTime<Utc>,

    /// Projected completion computed at submission; never recomputed.
    pub estimated_completion: DateTime<Utc>,
}

// ============================================================================
// Request States
// ============================================================================

/// Waiting in its type's queue. Initial state for every request.
#[derive(Debug, Clone, Serialize)]
pub struct Pending {}

impl RequestState for Pending {
    const STATUS: RequestStatus = RequestStatus::Pending;
}

/// Handled by an admin without a note.
#[derive(Debug, Clone, Serialize)]
pub struct Processed {
    pub processed_at: DateTime<Utc>,
}

impl RequestState for Processed {
    const STATUS: RequestStatus = RequestStatus::Processed;
}

/// Granted, with the admin's note.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved {
    pub note: String,
    pub resolved_at: DateTime<Utc>,
}

impl RequestState for Resolved {
    const STATUS: RequestStatus = RequestStatus::Resolved;
}

/// Declined, with the admin's note.
#[derive(Debug, Clone, Serialize)]
pub struct Rejected {
    pub note: String,
    pub rejected_at: DateTime<Utc>,
}

impl RequestState for Rejected {
    const STATUS: RequestStatus = RequestStatus::Rejected;
}

/// Withdrawn by the student.
#[derive(Debug, Clone, Serialize)]
pub struct Canceled {
    pub canceled_at: DateTime<Utc>,
}

impl RequestState for Canceled {
    const STATUS: RequestStatus = RequestStatus::Canceled;
}

/// Unique identifier for a request in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        RequestId(uuid)
    }
}

impl FromStr for RequestId {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(RequestId)
            .map_err(|e| RegistrarError::ValidationError(format!("invalid request id '{}': {}", s, e)))
    }
}

impl std::ops::Deref for RequestId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// Unified Request Representation
// ============================================================================

/// Enum that can hold a request in any state.
///
/// Used for storage and listings where requests are handled uniformly
/// regardless of their current state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "request")]
pub enum AnyRequest {
    Pending(Request<Pending>),
    Processed(Request<Processed>),
    Resolved(Request<Resolved>),
    Rejected(Request<Rejected>),
    Canceled(Request<Canceled>),
}

impl AnyRequest {
    /// Get the request ID regardless of state.
    pub fn id(&self) -> RequestId {
        self.data().id
    }

    /// Get the request data regardless of state.
    pub fn data(&self) -> &RequestData {
        match self {
            AnyRequest::Pending(r) => &r.data,
            AnyRequest::Processed(r) => &r.data,
            AnyRequest::Resolved(r) => &r.data,
            AnyRequest::Rejected(r) => &r.data,
            AnyRequest::Canceled(r) => &r.data,
        }
    }

    pub fn status(&self) -> RequestStatus {
        match self {
            AnyRequest::Pending(_) => RequestStatus::Pending,
            AnyRequest::Processed(_) => RequestStatus::Processed,
            AnyRequest::Resolved(_) => RequestStatus::Resolved,
            AnyRequest::Rejected(_) => RequestStatus::Rejected,
            AnyRequest::Canceled(_) => RequestStatus::Canceled,
        }
    }

    /// Admin note, present only on resolved and rejected requests.
    pub fn note(&self) -> Option<&str> {
        match self {
            AnyRequest::Resolved(r) => Some(&r.state.note),
            AnyRequest::Rejected(r) => Some(&r.state.note),
            _ => None,
        }
    }

    /// When the current terminal status was applied.
    pub fn status_changed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            AnyRequest::Pending(_) => None,
            AnyRequest::Processed(r) => Some(r.state.processed_at),
            AnyRequest::Resolved(r) => Some(r.state.resolved_at),
            AnyRequest::Rejected(r) => Some(r.state.rejected_at),
            AnyRequest::Canceled(r) => Some(r.state.canceled_at),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, AnyRequest::Pending(_))
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    /// Try to extract as a Pending request.
    pub fn as_pending(&self) -> Option<&Request<Pending>> {
        match self {
            AnyRequest::Pending(r) => Some(r),
            _ => None,
        }
    }

    /// Try to take as a Pending request, consuming self.
    pub fn into_pending(self) -> Option<Request<Pending>> {
        match self {
            AnyRequest::Pending(r) => Some(r),
            _ => None,
        }
    }

    /// Rebuild a request from its stored columns.
    pub fn from_parts(
        data: RequestData,
        status: RequestStatus,
        note: Option<String>,
        status_changed_at: Option<DateTime<Utc>>,
    ) -> Self {
        // Terminal rows written by this crate always carry a timestamp; fall
        // back to the submission time for rows that predate the column.
        let changed_at = status_changed_at.unwrap_or(data.created_at);
        let note = note.unwrap_or_default();
        match status {
            RequestStatus::Pending => AnyRequest::Pending(Request {
                state: Pending {},
                data,
            }),
            RequestStatus::Processed => AnyRequest::Processed(Request {
                state: Processed {
                    processed_at: changed_at,
                },
                data,
            }),
            RequestStatus::Resolved => AnyRequest::Resolved(Request {
                state: Resolved {
                    note,
                    resolved_at: changed_at,
                },
                data,
            }),
            RequestStatus::Rejected => AnyRequest::Rejected(Request {
                state: Rejected {
                    note,
                    rejected_at: changed_at,
                },
                data,
            }),
            RequestStatus::Canceled => AnyRequest::Canceled(Request {
                state: Canceled {
                    canceled_at: changed_at,
                },
                data,
            }),
        }
    }
}

// Conversion traits for going from typed Request to AnyRequest

impl From<Request<Pending>> for AnyRequest {
    fn from(r: Request<Pending>) -> Self {
        AnyRequest::Pending(r)
    }
}

impl From<Request<Processed>> for AnyRequest {
    fn from(r: Request<Processed>) -> Self {
        AnyRequest::Processed(r)
    }
}

impl From<Request<Resolved>> for AnyRequest {
    fn from(r: Request<Resolved>) -> Self {
        AnyRequest::Resolved(r)
    }
}

impl From<Request<Rejected>> for AnyRequest {
    fn from(r: Request<Rejected>) -> Self {
        AnyRequest::Rejected(r)
    }
}

impl From<Request<Canceled>> for AnyRequest {
    fn from(r: Request<Canceled>) -> Self {
        AnyRequest::Canceled(r)
    }
}

//! Error types for the request queue.

use thiserror::Error;

use crate::request::RequestId;

/// Result type alias using the registrar error type.
pub type Result<T> = std::result::Result<T, RegistrarError>;

/// Main error type for the request queue.
#[derive(Error, Debug)]
pub enum RegistrarError {
    /// Request not found
    #[error("Request not found: {0}")]
    RequestNotFound(RequestId),

    /// Student account not found
    #[error("Student not found: {0}")]
    StudentNotFound(String),

    /// Request is in an invalid state for the requested operation
    #[error("Invalid state transition: request {0} is in state '{1}', expected '{2}'")]
    InvalidState(RequestId, String, String),

    /// Caller-supplied input was missing or malformed
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The storage collaborator failed. Never retried by this crate.
    #[error("Storage unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    /// An email could not be delivered.
    ///
    /// Only ever observed by the mail outbox, which logs it; lifecycle operations
    /// never return this variant.
    #[error("Mail delivery failed: {0}")]
    Mail(String),

    /// HTTP client error (webhook mail relay)
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RegistrarError {
    /// True for errors caused by a missing record rather than a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistrarError::RequestNotFound(_) | RegistrarError::StudentNotFound(_)
        )
    }
}

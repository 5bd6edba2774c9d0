//! Notifications shown to students in the portal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub Uuid);

impl From<Uuid> for NotificationId {
    fn from(uuid: Uuid) -> Self {
        NotificationId(uuid)
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message recorded for a student on every request transition.
///
/// Notifications are append-only: they are created, listed in creation order
/// and deleted in bulk by their owner, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub student_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(student_id: impl Into<String>, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: NotificationId::from(Uuid::new_v4()),
            student_id: student_id.into(),
            message: message.into(),
            created_at: now,
        }
    }
}

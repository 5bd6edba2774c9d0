//! Login sessions.
//!
//! The HTTP layer keeps only the session key in a cookie. The record behind it
//! says whose session it is and when it stops being valid.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::student::AccountRole;

/// How long a session stays valid after it is created.
pub const SESSION_LIFETIME_MINUTES: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub student_id: String,
    pub role: AccountRole,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A fresh session with a random key, valid from `now`.
    pub fn new(student_id: impl Into<String>, role: AccountRole, now: DateTime<Utc>) -> Self {
        Self {
            key: Uuid::new_v4().to_string(),
            student_id: student_id.into(),
            role,
            expires_at: now + Duration::minutes(SESSION_LIFETIME_MINUTES),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_expires_after_lifetime() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
        let session = Session::new("60001", AccountRole::Student, now);

        assert!(!session.is_expired(now + Duration::minutes(19)));
        assert!(session.is_expired(now + Duration::minutes(20)));
    }
}

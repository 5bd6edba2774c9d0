//! Student account records.
//!
//! The portal keeps only what the request workflow needs: an id that requests
//! are filed under, contact details, a role, and the one-shot tokens used by
//! the email verification and password reset flows. Credentials live with the
//! external authentication layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistrarError;

/// First student id minus one; ids are assigned sequentially above it.
pub const STUDENT_ID_BASE: u64 = 60000;

/// Minutes during which an issued reset token is handed out again instead of
/// a new one.
pub const RESET_TOKEN_REUSE_MINUTES: i64 = 5;

/// Who an account belongs to. Managers are the admins that review requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    #[default]
    Student,
    Manager,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Student => "student",
            AccountRole::Manager => "manager",
        }
    }
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountRole {
    type Err = RegistrarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(AccountRole::Student),
            "manager" => Ok(AccountRole::Manager),
            other => Err(RegistrarError::ValidationError(format!(
                "unknown account role '{}'",
                other
            ))),
        }
    }
}

/// Where to reach an account holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: AccountRole,
    pub verified: bool,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    pub reset_token_issued_at: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

impl Student {
    /// Id for the student registered after `existing` others.
    pub fn next_id(existing: u64) -> String {
        (STUDENT_ID_BASE + existing + 1).to_string()
    }

    pub fn contact(&self) -> ContactDetails {
        ContactDetails {
            email: self.email.clone(),
            phone: self.phone.clone(),
        }
    }

    /// The reset token if it was issued recently enough to hand out again.
    pub fn reusable_reset_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let window_start = now - Duration::minutes(RESET_TOKEN_REUSE_MINUTES);
        match (&self.reset_token, self.reset_token_issued_at) {
            (Some(token), Some(issued_at)) if issued_at > window_start => Some(token),
            _ => None,
        }
    }
}

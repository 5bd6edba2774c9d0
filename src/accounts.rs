//! Account flows: registration, email verification, password reset, contact
//! details and login sessions.
//!
//! Only record keeping and email dispatch live here. Credentials are owned by
//! the external authentication layer, which calls [`AccountService::consume_reset_token`]
//! before storing a new password.

use std::sync::Arc;

use rand::Rng;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::RegistrarConfig;
use crate::domain::session::Session;
use crate::domain::student::{AccountRole, ContactDetails, Student};
use crate::error::{RegistrarError, Result};
use crate::mail::Email;
use crate::outbox::MailOutbox;
use crate::storage::AccountStorage;

pub const VERIFICATION_SUBJECT: &str = "Email Verification Link";
pub const RESET_SUBJECT: &str = "Reset Password Link";

/// Attempts at drawing a reset token that no other student currently holds.
const RESET_TOKEN_ATTEMPTS: usize = 8;

/// Address to mail an account holder at, if they have an account.
///
/// Shared by [`AccountService::student_contact`] and the lifecycle manager.
pub(crate) async fn contact_email<S: AccountStorage + ?Sized>(
    storage: &S,
    student_id: &str,
) -> Result<Option<String>> {
    Ok(storage
        .get_student(student_id)
        .await?
        .map(|student| student.email))
}

fn validate_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(RegistrarError::ValidationError(format!(
            "invalid email address '{}'",
            email
        )));
    }
    Ok(email)
}

pub struct AccountService<S> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    outbox: MailOutbox,
    base_url: String,
}

impl<S: AccountStorage> AccountService<S> {
    pub fn new(storage: Arc<S>, outbox: MailOutbox, base_url: impl Into<String>) -> Self {
        Self {
            storage,
            clock: Arc::new(SystemClock),
            outbox,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build a service whose links point at `config.base_url`.
    pub fn from_config(storage: Arc<S>, outbox: MailOutbox, config: &RegistrarConfig) -> Self {
        Self::new(storage, outbox, config.base_url.clone())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register a new, unverified student and mail them a verification link.
    ///
    /// # Errors
    /// `ValidationError` if the address is malformed or already registered.
    pub async fn register_student(&self, email: &str) -> Result<Student> {
        self.register(email, AccountRole::Student).await
    }

    /// Register an account with the given role. Ids are shared across roles.
    #[tracing::instrument(skip(self))]
    pub async fn register(&self, email: &str, role: AccountRole) -> Result<Student> {
        let email = validate_email(email)?;
        if self.storage.find_student_by_email(email).await?.is_some() {
            return Err(RegistrarError::ValidationError(format!(
                "email {} is already registered",
                email
            )));
        }

        let existing = self.storage.count_students().await?;
        let token = Uuid::new_v4().simple().to_string();
        let student = Student {
            id: Student::next_id(existing),
            email: email.to_string(),
            phone: None,
            role,
            verified: false,
            verification_token: Some(token.clone()),
            reset_token: None,
            reset_token_issued_at: None,
            registered_at: self.clock.now(),
        };
        self.storage.insert_student(&student).await?;

        tracing::info!(student_id = %student.id, "Account registered");

        self.outbox.enqueue(Email::new(
            student.email.clone(),
            VERIFICATION_SUBJECT,
            format!("{}/verify-email?token={}", self.base_url, token),
        ));
        Ok(student)
    }

    /// Mark the holder of `token` verified. `None` if no student holds it.
    #[tracing::instrument(skip(self, token))]
    pub async fn verify_email(&self, token: &str) -> Result<Option<Student>> {
        let Some(mut student) = self.storage.find_student_by_verification_token(token).await?
        else {
            tracing::debug!("Unknown verification token");
            return Ok(None);
        };

        student.verified = true;
        student.verification_token = None;
        self.storage.update_student(&student).await?;

        tracing::info!(student_id = %student.id, "Email verified");
        Ok(Some(student))
    }

    /// Issue (or re-issue) a reset token and mail the reset link.
    ///
    /// A token issued within the last few minutes is sent again instead of a
    /// new one. Returns `None` for an unknown address.
    #[tracing::instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<Option<String>> {
        let Some(mut student) = self.storage.find_student_by_email(email.trim()).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(None);
        };

        let now = self.clock.now();
        let token = match student.reusable_reset_token(now) {
            Some(token) => {
                tracing::debug!(student_id = %student.id, "Reusing recent reset token");
                token.to_string()
            }
            None => {
                let token = self.fresh_reset_token().await?;
                student.reset_token = Some(token.clone());
                student.reset_token_issued_at = Some(now);
                self.storage.update_student(&student).await?;
                token
            }
        };

        tracing::info!(student_id = %student.id, "Password reset link queued");
        self.outbox.enqueue(Email::new(
            student.email.clone(),
            RESET_SUBJECT,
            format!(
                "Click the following link to reset your password: {}/reset-password?resetKey={}",
                self.base_url, token
            ),
        ));
        Ok(Some(token))
    }

    /// Invalidate a reset token and return its holder.
    #[tracing::instrument(skip(self, token))]
    pub async fn consume_reset_token(&self, token: &str) -> Result<Option<Student>> {
        let Some(mut student) = self.storage.find_student_by_reset_token(token).await? else {
            return Ok(None);
        };

        student.reset_token = None;
        student.reset_token_issued_at = None;
        self.storage.update_student(&student).await?;

        tracing::info!(student_id = %student.id, "Reset token consumed");
        Ok(Some(student))
    }

    /// Address to mail a student at, if they have an account.
    pub async fn student_contact(&self, student_id: &str) -> Result<Option<String>> {
        contact_email(self.storage.as_ref(), student_id).await
    }

    /// Email and phone of an account, if it exists.
    pub async fn contact_details(&self, student_id: &str) -> Result<Option<ContactDetails>> {
        Ok(self
            .storage
            .get_student(student_id)
            .await?
            .map(|student| student.contact()))
    }

    /// Change an account's email and/or phone. `None` leaves a field as is;
    /// an empty phone clears it.
    ///
    /// Status emails go to the new address from the next transition on.
    ///
    /// # Errors
    /// - `StudentNotFound` if no account has this id
    /// - `ValidationError` if the email is malformed or held by another account
    #[tracing::instrument(skip(self, email, phone))]
    pub async fn update_contact(
        &self,
        student_id: &str,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<ContactDetails> {
        let mut student = self
            .storage
            .get_student(student_id)
            .await?
            .ok_or_else(|| RegistrarError::StudentNotFound(student_id.to_string()))?;

        if let Some(email) = email {
            let email = validate_email(email)?;
            if email != student.email {
                if let Some(holder) = self.storage.find_student_by_email(email).await? {
                    return Err(RegistrarError::ValidationError(format!(
                        "email {} is already registered to {}",
                        email, holder.id
                    )));
                }
                student.email = email.to_string();
            }
        }
        if let Some(phone) = phone {
            let phone = phone.trim();
            student.phone = (!phone.is_empty()).then(|| phone.to_string());
        }

        self.storage.update_student(&student).await?;
        tracing::info!(student_id = %student.id, "Contact details updated");
        Ok(student.contact())
    }

    /// Every account with `role`, in registration order.
    pub async fn list_accounts(&self, role: AccountRole) -> Result<Vec<Student>> {
        self.storage.list_students(role).await
    }

    /// Open a session for an existing account.
    ///
    /// # Errors
    /// `StudentNotFound` if no account has this id.
    #[tracing::instrument(skip(self))]
    pub async fn create_session(&self, student_id: &str) -> Result<Session> {
        let student = self
            .storage
            .get_student(student_id)
            .await?
            .ok_or_else(|| RegistrarError::StudentNotFound(student_id.to_string()))?;

        let session = Session::new(student.id, student.role, self.clock.now());
        self.storage.insert_session(&session).await?;
        tracing::debug!(expires_at = %session.expires_at, "Session created");
        Ok(session)
    }

    /// The live session behind `key`. An expired session is deleted and
    /// reported as absent.
    #[tracing::instrument(skip(self, key))]
    pub async fn get_session(&self, key: &str) -> Result<Option<Session>> {
        let Some(session) = self.storage.get_session(key).await? else {
            return Ok(None);
        };
        if session.is_expired(self.clock.now()) {
            tracing::debug!(student_id = %session.student_id, "Session expired");
            self.storage.delete_session(key).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// End a session. Returns whether it existed.
    #[tracing::instrument(skip(self, key))]
    pub async fn remove_session(&self, key: &str) -> Result<bool> {
        self.storage.delete_session(key).await
    }

    async fn fresh_reset_token(&self) -> Result<String> {
        for _ in 0..RESET_TOKEN_ATTEMPTS {
            let candidate = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
            if self
                .storage
                .find_student_by_reset_token(&candidate)
                .await?
                .is_none()
            {
                return Ok(candidate);
            }
        }
        Err(RegistrarError::Other(anyhow::anyhow!(
            "could not draw an unused reset token after {} attempts",
            RESET_TOKEN_ATTEMPTS
        )))
    }
}

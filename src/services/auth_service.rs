//! Domain service for authentication and credential rotation.
//!
//! Lock, expiry, and first-login states are ordinary outcomes of
//! authentication rather than errors, so the engine returns a sum type and
//! leaves the HTTP translation to the edge.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors specific to authentication and password-change operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub(crate) fn storage(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }

    pub(crate) fn internal(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result of an authentication attempt. `BadCredentials` covers both an
/// unknown username and a hash mismatch; callers cannot tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Success { user_id: i32 },
    BadCredentials,
    PermanentlyLocked,
    TemporarilyLocked { until: DateTime<Utc> },
    PasswordExpired { user_id: i32 },
    FirstLoginRequired { user_id: i32 },
}

/// Why a login was deferred into the mandatory password-change flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    FirstLogin,
    PasswordExpired,
}

impl ChangeReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FirstLogin => "First Login",
            Self::PasswordExpired => "Password Expired",
        }
    }
}

/// Domain service trait for authentication and password changes.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Runs the full credential check: lookup, lock evaluation, hash check,
    /// expiry check, first-login check, counter update.
    async fn authenticate(&self, username: &str, password: &str)
    -> Result<AuthOutcome, AuthError>;

    /// Voluntary change by an authenticated user; attested by the current
    /// password.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] if the current password is wrong,
    /// [`AuthError::Validation`] on policy or confirmation violations.
    async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError>;

    /// Mandatory change after a `PasswordExpired` or `FirstLoginRequired`
    /// outcome; attested by the session's one-shot token, so the old
    /// password is not re-checked.
    async fn change_password_attested(
        &self,
        username: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError>;
}

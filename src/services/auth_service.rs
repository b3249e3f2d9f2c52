//! Domain service for the two-factor authentication workflow.
//!
//! Covers login (password check + OTP challenge + OTP verification) and the
//! three-step password reset. All state lives on the user row; the service is
//! stateless between calls.

use serde::Serialize;
use thiserror::Error;

use crate::domain::Permissions;
use crate::services::token::TokenPair;

/// Errors surfaced by authentication operations. Everything here is a
/// domain outcome; unexpected infrastructure failures travel through
/// [`AuthError::Database`] / [`AuthError::Internal`] and are rendered as a
/// generic server error at the API boundary.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User not found")]
    UserNotFound,

    #[error("Account is not active")]
    AccountInactive,

    #[error("{message}")]
    AccountLocked { permanent: bool, message: String },

    #[error("Invalid credentials. {attempts_remaining} attempts remaining before next lockout.")]
    InvalidCredentials { attempts_remaining: i32 },

    #[error("Cannot reuse any of your last 5 passwords")]
    PasswordReuse,

    #[error("No valid OTP found")]
    OtpMissing,

    #[error("OTP has expired")]
    OtpExpired,

    #[error("Too many attempts. Please request a new OTP")]
    OtpAttemptsExhausted,

    #[error("Invalid OTP")]
    OtpInvalid,

    #[error("Failed to send OTP email. Please try again.")]
    NotificationFailed,

    #[error("{field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result of login step 1 and of a reset request: a code was dispatched.
/// Only the masked address leaves the service; never the code.
#[derive(Debug, Clone, Serialize)]
pub struct LoginChallenge {
    pub user_id: String,
    pub masked_email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DesignationInfo {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_superuser: bool,
    pub designation: Option<DesignationInfo>,
}

impl UserProfile {
    /// Flat permission lookup; superusers bypass the map.
    #[must_use]
    pub fn can(&self, module: &str, action: &str) -> bool {
        if self.is_superuser {
            return true;
        }
        self.designation
            .as_ref()
            .is_some_and(|d| d.permissions.allows(module, action))
    }
}

/// Result of login step 2: the session artifact plus the resolved profile.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    pub tokens: TokenPair,
    pub profile: UserProfile,
}

/// The authentication workflow. Implementations must serialize per-user
/// mutation (see `db::locks`): concurrent verification attempts against the
/// same user must not double-spend attempt counters.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Login step 1: password check, lockout evaluation, OTP dispatch.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidCredentials`] on a wrong password (the failure
    /// counter is persisted before returning), [`AuthError::AccountLocked`]
    /// when a lock window is active, [`AuthError::NotificationFailed`] when
    /// dispatch fails (the generated OTP is invalidated).
    async fn login(&self, identifier: &str, password: &str) -> Result<LoginChallenge, AuthError>;

    /// Login step 2: verify the emailed code and issue the token pair.
    async fn verify_login_otp(
        &self,
        identifier: &str,
        code: &str,
        ip_address: Option<String>,
    ) -> Result<AuthenticatedUser, AuthError>;

    /// Start a password reset: dispatch an OTP without requiring a password.
    async fn request_password_reset(&self, identifier: &str)
        -> Result<LoginChallenge, AuthError>;

    /// Check a reset code while keeping it live for the completion step.
    async fn verify_reset_otp(&self, identifier: &str, code: &str) -> Result<(), AuthError>;

    /// Finish a reset: re-verify the same code, rotate the password, clear
    /// OTP state and lock counters.
    ///
    /// # Errors
    ///
    /// [`AuthError::PasswordReuse`] aborts before the OTP is consumed, so a
    /// retry with a different password inside the window still succeeds.
    async fn complete_password_reset(
        &self,
        identifier: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;
}

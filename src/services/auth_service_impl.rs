//! `SeaORM` implementation of the [`AuthService`] workflow.
//!
//! Each operation is request-scoped: load the user, apply policy, persist
//! the transitions, return a structured result. Per-user sequences run under
//! the row lock so concurrent attempts cannot double-spend counters.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::config::SecurityConfig;
use crate::db::{RowLocks, Store, UserRepository};
use crate::db::repositories::user::SetPasswordOutcome;
use crate::domain::lockout::{self, LockState};
use crate::domain::otp::{self, OtpSnapshot, OtpVerdict};
use crate::domain::Actor;
use crate::entities::users;
use crate::services::auth_service::{
    AuthError, AuthService, AuthenticatedUser, DesignationInfo, LoginChallenge, UserProfile,
};
use crate::services::notifier::{self, Notifier};
use crate::services::token::{Claims, TokenIssuer};

enum ChallengeKind {
    Login,
    Reset,
}

pub struct SeaOrmAuthService {
    store: Store,
    security: SecurityConfig,
    notifier: Arc<dyn Notifier>,
    tokens: Arc<dyn TokenIssuer>,
    locks: RowLocks,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        security: SecurityConfig,
        notifier: Arc<dyn Notifier>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            store,
            security,
            notifier,
            tokens,
            locks: RowLocks::new(),
        }
    }

    fn users(&self) -> UserRepository {
        self.store.users(&self.security)
    }

    async fn load_user(&self, identifier: &str) -> Result<users::Model, AuthError> {
        self.users()
            .find(identifier)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Evaluate the lockout policy and persist whichever transition it
    /// reports. Returns the (possibly counter-reset) model on the unlocked
    /// path.
    async fn check_lockout(&self, user: users::Model) -> Result<users::Model, AuthError> {
        let now = Utc::now();
        match lockout::evaluate(
            user.failed_login_attempts,
            user.last_failed_login,
            user.permanent_lock,
            now,
        ) {
            LockState::NotLocked => Ok(user),
            LockState::Locked { permanent, message } => {
                Err(AuthError::AccountLocked { permanent, message })
            }
            LockState::BecamePermanent { message } => {
                self.users()
                    .mark_permanently_locked(user, lockout::PERMANENT_LOCK_REASON)
                    .await?;
                Err(AuthError::AccountLocked {
                    permanent: true,
                    message,
                })
            }
            LockState::WindowElapsed => {
                let mut unlocked = user.clone();
                self.users().reset_failed_attempts(user).await?;
                unlocked.failed_login_attempts = 0;
                unlocked.last_failed_login = None;
                unlocked.locked_until = None;
                Ok(unlocked)
            }
        }
    }

    /// Issue a fresh code, persist it, and dispatch it. A dispatch failure
    /// invalidates the code so the user is never stuck mid-challenge.
    async fn issue_challenge(
        &self,
        user: users::Model,
        kind: ChallengeKind,
    ) -> Result<LoginChallenge, AuthError> {
        let now = Utc::now();
        let ttl = Duration::minutes(self.security.otp_ttl_minutes);
        let issued = otp::issue(now, ttl);

        let user_id = user.user_id.clone();
        let email = user.email.clone();
        let first_name = user.first_name.clone();

        let repo = self.users();
        repo.store_otp(user, &issued).await?;

        let (subject, body) = match kind {
            ChallengeKind::Login => notifier::login_otp_message(&first_name, &issued.code),
            ChallengeKind::Reset => notifier::reset_otp_message(&issued.code),
        };

        if let Err(err) = self.notifier.send(&email, &subject, &body).await {
            warn!("OTP dispatch for {user_id} failed: {err}");
            if let Some(user) = repo.find(&user_id).await? {
                repo.clear_otp(user).await?;
            }
            return Err(AuthError::NotificationFailed);
        }

        Ok(LoginChallenge {
            user_id,
            masked_email: mask_email(&email),
        })
    }

    async fn designation_info(
        &self,
        designation_id: Option<i32>,
    ) -> Result<Option<DesignationInfo>, AuthError> {
        let Some(id) = designation_id else {
            return Ok(None);
        };
        let designation = self.store.designations().get_by_id(id).await?;
        Ok(designation.map(|d| DesignationInfo {
            id: d.id,
            name: d.name,
            code: d.code,
            permissions: crate::domain::Permissions::from_value(&d.permissions),
        }))
    }

    /// Apply a failed [`OtpVerdict`]'s side effects and map it to the error
    /// returned to the caller. The side effects commit even though the
    /// operation fails.
    async fn settle_otp_failure(&self, user: users::Model, verdict: OtpVerdict) -> AuthError {
        let repo = self.users();
        match verdict {
            OtpVerdict::Accepted { .. } => {
                AuthError::Internal("accepted verdict is not a failure".to_string())
            }
            OtpVerdict::Missing => AuthError::OtpMissing,
            OtpVerdict::Expired => match repo.clear_otp(user).await {
                Ok(()) => AuthError::OtpExpired,
                Err(err) => err.into(),
            },
            OtpVerdict::AttemptsExhausted => AuthError::OtpAttemptsExhausted,
            OtpVerdict::Mismatch { attempts } => {
                match repo.record_otp_mismatch(user, attempts).await {
                    Ok(()) => AuthError::OtpInvalid,
                    Err(err) => err.into(),
                }
            }
        }
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(&self, identifier: &str, password: &str) -> Result<LoginChallenge, AuthError> {
        let identifier = normalize_identifier(identifier);
        let _guard = self.locks.acquire(&identifier).await;

        let user = self.load_user(&identifier).await?;
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }
        let user = self.check_lockout(user).await?;

        let repo = self.users();
        if !repo.verify_password(&user, password).await? {
            let update = lockout::register_failure(user.failed_login_attempts, Utc::now());
            let attempts_remaining = lockout::attempts_remaining(update.attempts);
            // The incremented counter commits even though the login fails.
            repo.register_failed_login(user, &update).await?;
            return Err(AuthError::InvalidCredentials { attempts_remaining });
        }

        repo.reset_failed_attempts(user.clone()).await?;
        info!("Password verified for {identifier}, issuing OTP challenge");
        self.issue_challenge(user, ChallengeKind::Login).await
    }

    async fn verify_login_otp(
        &self,
        identifier: &str,
        code: &str,
        ip_address: Option<String>,
    ) -> Result<AuthenticatedUser, AuthError> {
        let identifier = normalize_identifier(identifier);
        let _guard = self.locks.acquire(&identifier).await;

        let user = self.load_user(&identifier).await?;
        let now = Utc::now();

        let verdict = otp::verify(
            OtpSnapshot {
                code: user.otp_code.as_deref(),
                expires_at: user.otp_expiry,
                attempts: user.otp_attempts,
                max_attempts: user.otp_max_attempts,
            },
            code,
            true,
            now,
        );

        let OtpVerdict::Accepted { clear_code } = verdict else {
            return Err(self.settle_otp_failure(user, verdict).await);
        };

        let repo = self.users();
        repo.mark_otp_verified(user.clone(), clear_code).await?;
        repo.update_login_info(user.clone(), ip_address, now).await?;

        let designation = self.designation_info(user.designation_id).await?;
        let permissions = designation
            .as_ref()
            .map(|d| d.permissions.clone())
            .unwrap_or_default();

        let claims = Claims {
            user_id: user.user_id.clone(),
            username: user.username.clone(),
            is_superuser: user.is_superuser,
            permissions,
        };
        let tokens = self.tokens.issue(&claims)?;

        info!("Login completed for {identifier}");
        Ok(AuthenticatedUser {
            tokens,
            profile: UserProfile {
                user_id: user.user_id,
                username: user.username,
                email: user.email,
                first_name: user.first_name,
                last_name: user.last_name,
                is_superuser: user.is_superuser,
                designation,
            },
        })
    }

    async fn request_password_reset(
        &self,
        identifier: &str,
    ) -> Result<LoginChallenge, AuthError> {
        let identifier = normalize_identifier(identifier);
        let _guard = self.locks.acquire(&identifier).await;

        let user = self.load_user(&identifier).await?;
        if !user.is_active {
            return Err(AuthError::AccountInactive);
        }
        let user = self.check_lockout(user).await?;

        info!("Password reset requested for {identifier}");
        self.issue_challenge(user, ChallengeKind::Reset).await
    }

    async fn verify_reset_otp(&self, identifier: &str, code: &str) -> Result<(), AuthError> {
        let identifier = normalize_identifier(identifier);
        let _guard = self.locks.acquire(&identifier).await;

        let user = self.load_user(&identifier).await?;

        // Keep the code live: the completion step re-verifies it.
        let verdict = otp::verify(
            OtpSnapshot {
                code: user.otp_code.as_deref(),
                expires_at: user.otp_expiry,
                attempts: user.otp_attempts,
                max_attempts: user.otp_max_attempts,
            },
            code,
            false,
            Utc::now(),
        );

        let OtpVerdict::Accepted { clear_code } = verdict else {
            return Err(self.settle_otp_failure(user, verdict).await);
        };

        self.users().mark_otp_verified(user, clear_code).await?;
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        identifier: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let identifier = normalize_identifier(identifier);
        let _guard = self.locks.acquire(&identifier).await;

        let user = self.load_user(&identifier).await?;
        let repo = self.users();

        // Reuse is checked before the OTP is consumed so the user can retry
        // with a different password inside the same window.
        if repo.is_password_reused(&user.user_id, new_password).await? {
            return Err(AuthError::PasswordReuse);
        }

        // Re-verify the same code, expiry and attempts included: a stale
        // confirmation must not ride on a previously set `otp_verified`.
        let verdict = otp::verify(
            OtpSnapshot {
                code: user.otp_code.as_deref(),
                expires_at: user.otp_expiry,
                attempts: user.otp_attempts,
                max_attempts: user.otp_max_attempts,
            },
            code,
            true,
            Utc::now(),
        );

        let OtpVerdict::Accepted { clear_code } = verdict else {
            return Err(self.settle_otp_failure(user, verdict).await);
        };

        repo.mark_otp_verified(user.clone(), clear_code).await?;

        let actor = Actor::user(user.user_id.clone());
        match repo.set_password(user.clone(), new_password, &actor).await? {
            SetPasswordOutcome::Applied => {}
            SetPasswordOutcome::ReusedRecent => return Err(AuthError::PasswordReuse),
        }

        repo.finish_password_reset(user).await?;
        info!("Password reset completed for {identifier}");
        Ok(())
    }
}

/// Canonical form of the external identifier.
fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_uppercase()
}

/// First 3 characters of the local part stay visible; the rest is masked.
fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(3).collect();
            let masked = local.chars().count().saturating_sub(3);
            format!("{visible}{}@{domain}", "*".repeat(masked))
        }
        None => email.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_is_trimmed_and_uppercased() {
        assert_eq!(normalize_identifier("  emp2025a001 "), "EMP2025A001");
    }

    #[test]
    fn email_masking_keeps_three_chars_and_domain() {
        assert_eq!(mask_email("priya.sharma@college.edu"), "pri*********@college.edu");
        assert_eq!(mask_email("ab@college.edu"), "ab@college.edu");
        assert_eq!(mask_email("not-an-email"), "not-an-email");
    }
}

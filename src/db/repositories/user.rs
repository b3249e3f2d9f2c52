use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use tokio::task;

use super::audit::{AuditAction, AuditEntity, AuditRepository};
use crate::config::SecurityConfig;
use crate::domain::lockout::FailureUpdate;
use crate::domain::otp::IssuedOtp;
use crate::domain::Actor;
use crate::entities::{password_history, users};

/// Number of previous password hashes retained and checked for reuse.
pub const PASSWORD_HISTORY_DEPTH: usize = 5;

/// Fields required to create a user through the administrative workflow.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub designation_id: Option<i32>,
    pub phone_number: Option<String>,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Result of a `set_password` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetPasswordOutcome {
    Applied,
    /// The candidate matched one of the retained history hashes; nothing was
    /// mutated.
    ReusedRecent,
}

/// Credential store over the `users` table.
pub struct UserRepository {
    conn: DatabaseConnection,
    security: SecurityConfig,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection, security: SecurityConfig) -> Self {
        Self { conn, security }
    }

    /// Look up a non-deleted user by external id (already normalized).
    pub async fn find(&self, user_id: &str) -> Result<Option<users::Model>> {
        users::Entity::find_by_id(user_id.to_string())
            .filter(users::Column::IsDeleted.eq(false))
            .one(&self.conn)
            .await
            .context("Failed to query user by id")
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<users::Model>> {
        users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .filter(users::Column::IsDeleted.eq(false))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<users::Model>> {
        users::Entity::find()
            .filter(users::Column::Email.eq(email.to_lowercase()))
            .filter(users::Column::IsDeleted.eq(false))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")
    }

    /// Create a user, the first password-history row and the INSERT audit
    /// record in one transaction.
    pub async fn create(&self, new: NewUser, actor: &Actor) -> Result<users::Model> {
        if new.user_id.trim().is_empty() {
            anyhow::bail!("user_id is required");
        }
        if new.username.trim().is_empty() {
            anyhow::bail!("username is required");
        }
        if new.email.trim().is_empty() {
            anyhow::bail!("email is required");
        }

        let now = Utc::now();
        let password = new.password.clone();
        let security = self.security.clone();
        let password_hash = task::spawn_blocking(move || hash_password(&password, Some(&security)))
            .await
            .context("Password hashing task panicked")??;

        let txn = self.conn.begin().await?;

        let active = users::ActiveModel {
            user_id: Set(new.user_id.trim().to_uppercase()),
            username: Set(new.username.trim().to_string()),
            email: Set(new.email.trim().to_lowercase()),
            password_hash: Set(password_hash.clone()),
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            designation_id: Set(new.designation_id),
            phone_number: Set(new.phone_number),
            is_active: Set(true),
            is_staff: Set(new.is_staff),
            is_superuser: Set(new.is_superuser),
            is_email_verified: Set(false),
            failed_login_attempts: Set(0),
            last_failed_login: Set(None),
            locked_until: Set(None),
            permanent_lock: Set(false),
            lock_reason: Set(None),
            otp_code: Set(None),
            otp_created_at: Set(None),
            otp_expiry: Set(None),
            otp_attempts: Set(0),
            otp_max_attempts: Set(self.security.otp_max_attempts),
            otp_verified: Set(false),
            last_login: Set(None),
            last_login_ip: Set(None),
            password_changed_at: Set(Some(now)),
            created_by: Set(Some(actor.as_str().to_string())),
            created_at: Set(now),
            updated_by: Set(Some(actor.as_str().to_string())),
            updated_at: Set(now),
            is_deleted: Set(false),
            deleted_at: Set(None),
            deleted_by: Set(None),
        };
        let model = active.insert(&txn).await.context("Failed to insert user")?;

        let history = password_history::ActiveModel {
            user_id: Set(model.user_id.clone()),
            password_hash: Set(password_hash),
            created_at: Set(now),
            ..Default::default()
        };
        history
            .insert(&txn)
            .await
            .context("Failed to insert password history")?;

        AuditRepository::record_with(
            &txn,
            AuditEntity::User(model.user_id.clone()),
            AuditAction::Insert,
            actor,
            None,
            Some(snapshot(&model)),
            now,
        )
        .await?;

        txn.commit().await?;
        Ok(model)
    }

    /// Compare a candidate password against the stored hash.
    ///
    /// `spawn_blocking` because Argon2 verification is CPU-bound and would
    /// stall the async runtime if run inline.
    pub async fn verify_password(&self, user: &users::Model, password: &str) -> Result<bool> {
        let password_hash = user.password_hash.clone();
        let password = password.to_string();

        task::spawn_blocking(move || verify_against_hash(&password, &password_hash))
            .await
            .context("Password verification task panicked")?
    }

    /// Whether `raw` matches any of the retained history hashes. The current
    /// hash is always the newest history row, so "same as current" is caught
    /// by the same comparison.
    pub async fn is_password_reused(&self, user_id: &str, raw: &str) -> Result<bool> {
        let recent: Vec<String> = password_history::Entity::find()
            .filter(password_history::Column::UserId.eq(user_id))
            .order_by_desc(password_history::Column::CreatedAt)
            .order_by_desc(password_history::Column::Id)
            .limit(PASSWORD_HISTORY_DEPTH as u64)
            .all(&self.conn)
            .await
            .context("Failed to query password history")?
            .into_iter()
            .map(|row| row.password_hash)
            .collect();

        let raw = raw.to_string();
        task::spawn_blocking(move || {
            for hash in &recent {
                if verify_against_hash(&raw, hash)? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .await
        .context("Password history check task panicked")?
    }

    /// Rotate the stored password in one transaction: reuse check, hash,
    /// history append, prune to the retention depth, stamp
    /// `password_changed_at`.
    pub async fn set_password(
        &self,
        user: users::Model,
        raw: &str,
        actor: &Actor,
    ) -> Result<SetPasswordOutcome> {
        if self.is_password_reused(&user.user_id, raw).await? {
            return Ok(SetPasswordOutcome::ReusedRecent);
        }

        let now = Utc::now();
        let user_id = user.user_id.clone();
        let old_changed_at = user.password_changed_at;

        let password = raw.to_string();
        let security = self.security.clone();
        let new_hash = task::spawn_blocking(move || hash_password(&password, Some(&security)))
            .await
            .context("Password hashing task panicked")??;

        let txn = self.conn.begin().await?;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash.clone());
        active.password_changed_at = Set(Some(now));
        active.updated_by = Set(Some(actor.as_str().to_string()));
        active.updated_at = Set(now);
        active
            .update(&txn)
            .await
            .context("Failed to update password")?;

        let history = password_history::ActiveModel {
            user_id: Set(user_id.clone()),
            password_hash: Set(new_hash),
            created_at: Set(now),
            ..Default::default()
        };
        history
            .insert(&txn)
            .await
            .context("Failed to insert password history")?;

        // Retain only the most recent entries.
        let rows = password_history::Entity::find()
            .filter(password_history::Column::UserId.eq(user_id.clone()))
            .order_by_desc(password_history::Column::CreatedAt)
            .order_by_desc(password_history::Column::Id)
            .all(&txn)
            .await
            .context("Failed to query password history for pruning")?;
        for stale in rows.into_iter().skip(PASSWORD_HISTORY_DEPTH) {
            password_history::Entity::delete_by_id(stale.id)
                .exec(&txn)
                .await
                .context("Failed to prune password history")?;
        }

        AuditRepository::record_with(
            &txn,
            AuditEntity::User(user_id),
            AuditAction::Update,
            actor,
            Some(serde_json::json!({ "password_changed_at": old_changed_at })),
            Some(serde_json::json!({ "password_changed_at": now })),
            now,
        )
        .await?;

        txn.commit().await?;
        Ok(SetPasswordOutcome::Applied)
    }

    /// Persist one more failed password check and whichever tier boundary it
    /// crossed. Only the touched fields are written.
    pub async fn register_failed_login(
        &self,
        user: users::Model,
        update: &FailureUpdate,
    ) -> Result<()> {
        let mut active: users::ActiveModel = user.into();
        active.failed_login_attempts = Set(update.attempts);
        active.last_failed_login = Set(Some(update.last_failed_login));
        active.locked_until = Set(update.locked_until);
        if update.permanent_lock {
            active.permanent_lock = Set(true);
            active.lock_reason = Set(update.lock_reason.clone());
        }
        active
            .update(&self.conn)
            .await
            .context("Failed to persist failed login attempt")?;
        Ok(())
    }

    /// Zero the failure counters. Returns `false` (and writes nothing) for a
    /// permanently locked account; only an administrative unlock clears that.
    pub async fn reset_failed_attempts(&self, user: users::Model) -> Result<bool> {
        if user.permanent_lock {
            return Ok(false);
        }
        let mut active: users::ActiveModel = user.into();
        active.failed_login_attempts = Set(0);
        active.last_failed_login = Set(None);
        active.locked_until = Set(None);
        active
            .update(&self.conn)
            .await
            .context("Failed to reset failed attempts")?;
        Ok(true)
    }

    /// Persist the permanent-lock transition detected during evaluation.
    pub async fn mark_permanently_locked(&self, user: users::Model, reason: &str) -> Result<()> {
        let mut active: users::ActiveModel = user.into();
        active.permanent_lock = Set(true);
        active.lock_reason = Set(Some(reason.to_string()));
        active
            .update(&self.conn)
            .await
            .context("Failed to persist permanent lock")?;
        Ok(())
    }

    /// Store a freshly issued code, overwriting any prior one (single live
    /// OTP per user) and resetting the attempt counter.
    pub async fn store_otp(&self, user: users::Model, issued: &IssuedOtp) -> Result<()> {
        let mut active: users::ActiveModel = user.into();
        active.otp_code = Set(Some(issued.code.clone()));
        active.otp_created_at = Set(Some(issued.created_at));
        active.otp_expiry = Set(Some(issued.expires_at));
        active.otp_attempts = Set(0);
        active.otp_verified = Set(false);
        active
            .update(&self.conn)
            .await
            .context("Failed to store OTP")?;
        Ok(())
    }

    /// Drop the stored code and expiry (expired code, or dispatch failure).
    pub async fn clear_otp(&self, user: users::Model) -> Result<()> {
        let mut active: users::ActiveModel = user.into();
        active.otp_code = Set(None);
        active.otp_created_at = Set(None);
        active.otp_expiry = Set(None);
        active
            .update(&self.conn)
            .await
            .context("Failed to clear OTP")?;
        Ok(())
    }

    pub async fn record_otp_mismatch(&self, user: users::Model, attempts: i32) -> Result<()> {
        let mut active: users::ActiveModel = user.into();
        active.otp_attempts = Set(attempts);
        active
            .update(&self.conn)
            .await
            .context("Failed to record OTP attempt")?;
        Ok(())
    }

    /// Mark the stored code verified, optionally consuming it.
    pub async fn mark_otp_verified(&self, user: users::Model, clear_code: bool) -> Result<()> {
        let mut active: users::ActiveModel = user.into();
        active.otp_verified = Set(true);
        active.otp_attempts = Set(0);
        if clear_code {
            active.otp_code = Set(None);
            active.otp_created_at = Set(None);
            active.otp_expiry = Set(None);
        }
        active
            .update(&self.conn)
            .await
            .context("Failed to mark OTP verified")?;
        Ok(())
    }

    /// Successful login bookkeeping: login metadata plus counter reset.
    pub async fn update_login_info(
        &self,
        user: users::Model,
        ip_address: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut active: users::ActiveModel = user.into();
        active.last_login = Set(Some(now));
        active.last_login_ip = Set(ip_address);
        active.failed_login_attempts = Set(0);
        active.last_failed_login = Set(None);
        active.locked_until = Set(None);
        active
            .update(&self.conn)
            .await
            .context("Failed to update login info")?;
        Ok(())
    }

    /// Final step of a completed password reset: consume the OTP state and
    /// clear the lock counters.
    pub async fn finish_password_reset(&self, user: users::Model) -> Result<()> {
        let mut active: users::ActiveModel = user.into();
        active.otp_code = Set(None);
        active.otp_created_at = Set(None);
        active.otp_expiry = Set(None);
        active.otp_verified = Set(false);
        active.otp_attempts = Set(0);
        active.failed_login_attempts = Set(0);
        active.last_failed_login = Set(None);
        active.locked_until = Set(None);
        active
            .update(&self.conn)
            .await
            .context("Failed to finish password reset")?;
        Ok(())
    }

    /// Administrative unlock: the only path out of `permanent_lock`. Writes
    /// an UPDATE audit record in the same transaction.
    pub async fn admin_unlock(&self, user: users::Model, actor: &Actor) -> Result<()> {
        let now = Utc::now();
        let user_id = user.user_id.clone();
        let old = serde_json::json!({
            "permanent_lock": user.permanent_lock,
            "lock_reason": user.lock_reason,
            "failed_login_attempts": user.failed_login_attempts,
        });

        let txn = self.conn.begin().await?;

        let mut active: users::ActiveModel = user.into();
        active.permanent_lock = Set(false);
        active.lock_reason = Set(None);
        active.failed_login_attempts = Set(0);
        active.last_failed_login = Set(None);
        active.locked_until = Set(None);
        active.updated_by = Set(Some(actor.as_str().to_string()));
        active.updated_at = Set(now);
        active
            .update(&txn)
            .await
            .context("Failed to unlock account")?;

        AuditRepository::record_with(
            &txn,
            AuditEntity::User(user_id),
            AuditAction::Update,
            actor,
            Some(old),
            Some(serde_json::json!({
                "permanent_lock": false,
                "lock_reason": null,
                "failed_login_attempts": 0,
            })),
            now,
        )
        .await?;

        txn.commit().await?;
        Ok(())
    }

    /// Soft delete: flip the lifecycle flags and append the DELETE audit
    /// record atomically. Normal flows never remove the row.
    pub async fn soft_delete(&self, user: users::Model, actor: &Actor) -> Result<()> {
        let now = Utc::now();
        let user_id = user.user_id.clone();
        let old = snapshot(&user);

        let txn = self.conn.begin().await?;

        let mut active: users::ActiveModel = user.into();
        active.is_deleted = Set(true);
        active.deleted_at = Set(Some(now));
        active.deleted_by = Set(Some(actor.as_str().to_string()));
        active.is_active = Set(false);
        active.updated_by = Set(Some(actor.as_str().to_string()));
        active.updated_at = Set(now);
        active
            .update(&txn)
            .await
            .context("Failed to soft-delete user")?;

        AuditRepository::record_with(
            &txn,
            AuditEntity::User(user_id),
            AuditAction::Delete,
            actor,
            Some(old),
            None,
            now,
        )
        .await?;

        txn.commit().await?;
        Ok(())
    }

    /// Irreversible removal, reserved for privileged maintenance flows.
    pub async fn hard_delete(&self, user_id: &str) -> Result<()> {
        users::Entity::delete_by_id(user_id.to_string())
            .exec(&self.conn)
            .await
            .context("Failed to hard-delete user")?;
        Ok(())
    }
}

/// Audit snapshot of a user row. Secrets (password hash, OTP state) are
/// deliberately excluded.
fn snapshot(model: &users::Model) -> serde_json::Value {
    serde_json::json!({
        "username": model.username,
        "email": model.email,
        "first_name": model.first_name,
        "last_name": model.last_name,
        "designation_id": model.designation_id,
        "is_active": model.is_active,
        "is_staff": model.is_staff,
        "is_superuser": model.is_superuser,
        "is_email_verified": model.is_email_verified,
    })
}

/// Hash a password using Argon2id with optional custom params.
/// If config is None, uses the crate defaults.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = if let Some(cfg) = config {
        let params = Params::new(
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    } else {
        Argon2::default()
    };

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

fn verify_against_hash(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

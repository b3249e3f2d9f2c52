//! Progressive lockout policy.
//!
//! Tiers are cumulative over consecutive failed password checks, each window
//! measured from the last failure:
//!
//! | attempts | lock            |
//! |----------|-----------------|
//! | 0-2      | none            |
//! | 3-4      | 1 hour          |
//! | 5-7      | 6 hours         |
//! | >= 8     | permanent       |
//!
//! The functions here are pure over `(attempts, last_failed, permanent_lock,
//! now)`; callers persist the transitions they report (`BecamePermanent`,
//! `WindowElapsed`, the fields of [`FailureUpdate`]).

use chrono::{DateTime, Duration, Utc};

pub const ONE_HOUR_THRESHOLD: i32 = 3;
pub const SIX_HOUR_THRESHOLD: i32 = 5;
pub const PERMANENT_THRESHOLD: i32 = 8;

pub const PERMANENT_LOCK_REASON: &str =
    "Too many failed login attempts (8+). Administrative unlock required.";

/// Result of evaluating the lock status of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    NotLocked,
    /// Locked inside an active window, or permanently.
    Locked { permanent: bool, message: String },
    /// The attempt count crossed the permanent threshold but the flag was not
    /// persisted yet. The caller must set `permanent_lock` and `lock_reason`.
    BecamePermanent { message: String },
    /// A timed lock window has elapsed. The caller must reset the failure
    /// counters before treating the account as unlocked.
    WindowElapsed,
}

impl LockState {
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. } | Self::BecamePermanent { .. })
    }
}

/// Field updates produced by registering one more failed password check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureUpdate {
    pub attempts: i32,
    pub last_failed_login: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub permanent_lock: bool,
    pub lock_reason: Option<String>,
}

/// Evaluate lock status without mutating anything.
#[must_use]
pub fn evaluate(
    attempts: i32,
    last_failed: Option<DateTime<Utc>>,
    permanent_lock: bool,
    now: DateTime<Utc>,
) -> LockState {
    if permanent_lock {
        return LockState::Locked {
            permanent: true,
            message: "Account is permanently locked. Please contact administrator.".to_string(),
        };
    }

    let Some(last_failed) = last_failed else {
        return LockState::NotLocked;
    };
    if attempts < ONE_HOUR_THRESHOLD {
        return LockState::NotLocked;
    }

    if attempts >= PERMANENT_THRESHOLD {
        return LockState::BecamePermanent {
            message: "Account has been permanently locked due to too many failed attempts. \
                      Please contact administrator."
                .to_string(),
        };
    }

    if attempts >= SIX_HOUR_THRESHOLD {
        let lock_end = last_failed + Duration::hours(6);
        if now < lock_end {
            let remaining = lock_end - now;
            let hours = remaining.num_seconds() / 3600;
            let minutes = (remaining.num_seconds() % 3600) / 60;
            return LockState::Locked {
                permanent: false,
                message: format!(
                    "Account is locked for {hours}h {minutes}m due to multiple failed attempts."
                ),
            };
        }
        return LockState::WindowElapsed;
    }

    // 3-4 attempts: one hour window.
    let lock_end = last_failed + Duration::hours(1);
    if now < lock_end {
        let minutes = (lock_end - now).num_seconds() / 60;
        return LockState::Locked {
            permanent: false,
            message: format!("Account is locked for {minutes} minutes due to failed attempts."),
        };
    }
    LockState::WindowElapsed
}

/// Compute the state written back after one more failed password check.
///
/// The tier boundary crossed by the new count decides `locked_until`,
/// `permanent_lock` and `lock_reason`.
#[must_use]
pub fn register_failure(current_attempts: i32, now: DateTime<Utc>) -> FailureUpdate {
    let attempts = current_attempts.max(0) + 1;

    let mut update = FailureUpdate {
        attempts,
        last_failed_login: now,
        locked_until: None,
        permanent_lock: false,
        lock_reason: None,
    };

    if attempts >= PERMANENT_THRESHOLD {
        update.permanent_lock = true;
        update.lock_reason = Some(PERMANENT_LOCK_REASON.to_string());
    } else if attempts >= SIX_HOUR_THRESHOLD {
        update.locked_until = Some(now + Duration::hours(6));
    } else if attempts >= ONE_HOUR_THRESHOLD {
        update.locked_until = Some(now + Duration::hours(1));
    }

    update
}

/// Failed checks left before the next tier boundary (3, 5 or 8).
#[must_use]
pub const fn attempts_remaining(attempts: i32) -> i32 {
    if attempts < ONE_HOUR_THRESHOLD {
        ONE_HOUR_THRESHOLD - attempts
    } else if attempts < SIX_HOUR_THRESHOLD {
        SIX_HOUR_THRESHOLD - attempts
    } else if attempts < PERMANENT_THRESHOLD {
        PERMANENT_THRESHOLD - attempts
    } else {
        0
    }
}

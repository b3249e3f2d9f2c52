//! One-time passcode issue and verification.
//!
//! Codes are 6 decimal digits drawn from the OS CSPRNG, valid for a short
//! window and a bounded number of attempts. Verification is a pure function
//! over a snapshot of the stored state; the returned [`OtpVerdict`] tells the
//! caller exactly which fields to persist.
//!
//! State machine per user: `NONE -> ISSUED -> {VERIFIED, EXPIRED, EXHAUSTED}`.
//! Issuing always overwrites a prior unconsumed code, so at most one code is
//! live per user.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{DateTime, Duration, Utc};

pub const OTP_DIGITS: u32 = 6;
pub const DEFAULT_TTL_MINUTES: i64 = 3;
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// A freshly issued code. The plaintext exists only for out-of-band delivery
/// and must never be logged or echoed to the caller of the HTTP surface.
#[derive(Debug, Clone)]
pub struct IssuedOtp {
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Stored OTP state at verification time.
#[derive(Debug, Clone, Copy)]
pub struct OtpSnapshot<'a> {
    pub code: Option<&'a str>,
    pub expires_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub max_attempts: i32,
}

/// Outcome of checking a submitted code, with the persistence it requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpVerdict {
    /// Code matched. `clear_code` echoes the caller's `clear_on_success`
    /// choice: one-shot login consumption clears, the reset wizard keeps the
    /// code live for its confirmation step.
    Accepted { clear_code: bool },
    /// No code or expiry stored.
    Missing,
    /// Past expiry. The stored code must be cleared.
    Expired,
    /// The attempt budget was already spent. Nothing to persist.
    AttemptsExhausted,
    /// Wrong code. `attempts` is the incremented count to persist.
    Mismatch { attempts: i32 },
}

/// Issue a new code valid for `ttl` from `now`.
#[must_use]
pub fn issue(now: DateTime<Utc>, ttl: Duration) -> IssuedOtp {
    IssuedOtp {
        code: six_digit_code(),
        created_at: now,
        expires_at: now + ttl,
    }
}

/// Check `submitted` against the stored state.
///
/// Order of checks matters: missing before expired before exhausted before
/// mismatch, so an expired code reports expiry even when attempts are spent.
#[must_use]
pub fn verify(
    snapshot: OtpSnapshot<'_>,
    submitted: &str,
    clear_on_success: bool,
    now: DateTime<Utc>,
) -> OtpVerdict {
    let (Some(code), Some(expires_at)) = (snapshot.code, snapshot.expires_at) else {
        return OtpVerdict::Missing;
    };

    if now > expires_at {
        return OtpVerdict::Expired;
    }

    if snapshot.attempts >= snapshot.max_attempts {
        return OtpVerdict::AttemptsExhausted;
    }

    if submitted != code {
        return OtpVerdict::Mismatch {
            attempts: snapshot.attempts + 1,
        };
    }

    OtpVerdict::Accepted {
        clear_code: clear_on_success,
    }
}

/// Uniform 6-digit code from the OS CSPRNG.
///
/// Rejection-sampled below the largest multiple of 10^6 so the modulo does
/// not bias low codes.
fn six_digit_code() -> String {
    const RANGE: u32 = 1_000_000;
    const LIMIT: u32 = u32::MAX - (u32::MAX % RANGE);

    let mut rng = OsRng;
    loop {
        let value = rng.next_u32();
        if value < LIMIT {
            return format!("{:06}", value % RANGE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(code: &str, expires_in_secs: i64, attempts: i32, now: DateTime<Utc>) -> OtpSnapshot<'_> {
        OtpSnapshot {
            code: Some(code),
            expires_at: Some(now + Duration::seconds(expires_in_secs)),
            attempts,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[test]
    fn issued_codes_are_six_digits() {
        for _ in 0..32 {
            let otp = issue(Utc::now(), Duration::minutes(DEFAULT_TTL_MINUTES));
            assert_eq!(otp.code.len(), 6);
            assert!(otp.code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn expiry_is_ttl_from_now() {
        let now = Utc::now();
        let otp = issue(now, Duration::minutes(3));
        assert_eq!(otp.expires_at, now + Duration::minutes(3));
        assert_eq!(otp.created_at, now);
    }

    #[test]
    fn missing_state_is_reported_first() {
        let now = Utc::now();
        let empty = OtpSnapshot {
            code: None,
            expires_at: None,
            attempts: 0,
            max_attempts: 3,
        };
        assert_eq!(verify(empty, "123456", true, now), OtpVerdict::Missing);
    }

    #[test]
    fn expired_code_fails_even_with_zero_attempts() {
        let now = Utc::now();
        let snap = snapshot("123456", -1, 0, now);
        assert_eq!(verify(snap, "123456", true, now), OtpVerdict::Expired);
    }

    #[test]
    fn exhausted_attempts_reject_the_correct_code() {
        let now = Utc::now();
        let snap = snapshot("123456", 60, 3, now);
        assert_eq!(verify(snap, "123456", true, now), OtpVerdict::AttemptsExhausted);
    }

    #[test]
    fn mismatch_increments_attempts() {
        let now = Utc::now();
        let snap = snapshot("123456", 60, 1, now);
        assert_eq!(
            verify(snap, "000000", true, now),
            OtpVerdict::Mismatch { attempts: 2 }
        );
    }

    #[test]
    fn accepted_echoes_clear_choice() {
        let now = Utc::now();
        let snap = snapshot("123456", 60, 0, now);
        assert_eq!(
            verify(snap, "123456", true, now),
            OtpVerdict::Accepted { clear_code: true }
        );
        assert_eq!(
            verify(snap, "123456", false, now),
            OtpVerdict::Accepted { clear_code: false }
        );
    }
}

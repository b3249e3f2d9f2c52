//! End-to-end workflow tests against an in-memory database.
//!
//! Time-dependent cases rewrite the persisted timestamps instead of mocking
//! a clock: the domain policies take `now` explicitly and are unit-tested in
//! their own modules.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, Set};

use collegium::config::Config;
use collegium::db::NewUser;
use collegium::db::repositories::user::SetPasswordOutcome;
use collegium::domain::Actor;
use collegium::entities::users;
use collegium::services::{AuthError, AuthService, Notifier, OpaqueTokenIssuer};
use collegium::state::SharedState;

const TEST_PASSWORD: &str = "InitPass1!";

/// Captures every dispatched message so tests can read issued codes.
#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    fn codes(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, _, body)| extract_code(body))
            .collect()
    }

    fn last_code(&self) -> String {
        self.codes().pop().expect("no OTP dispatched")
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to_address: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((
            to_address.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
        Ok(())
    }
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> anyhow::Result<()> {
        anyhow::bail!("smtp relay unreachable")
    }
}

fn extract_code(body: &str) -> Option<String> {
    body.split_whitespace()
        .find(|token| token.len() == 6 && token.chars().all(|c| c.is_ascii_digit()))
        .map(ToString::to_string)
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    // A single pooled connection keeps the in-memory database shared.
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    // Cheap hashing keeps the suite fast; params are still valid Argon2id.
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config
}

async fn spawn_state() -> (Arc<SharedState>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let shared = SharedState::with_collaborators(
        test_config(),
        notifier.clone(),
        Arc::new(OpaqueTokenIssuer),
    )
    .await
    .expect("failed to build state");
    (Arc::new(shared), notifier)
}

async fn create_user(shared: &SharedState, user_id: &str) -> users::Model {
    shared
        .store
        .users(&shared.config.security)
        .create(
            NewUser {
                user_id: user_id.to_string(),
                username: format!("user-{}", user_id.to_lowercase()),
                email: format!("{}@college.edu", user_id.to_lowercase()),
                password: TEST_PASSWORD.to_string(),
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                designation_id: None,
                phone_number: None,
                is_staff: false,
                is_superuser: false,
            },
            &Actor::System,
        )
        .await
        .expect("failed to create user")
}

async fn load_user(shared: &SharedState, user_id: &str) -> users::Model {
    shared
        .store
        .users(&shared.config.security)
        .find(user_id)
        .await
        .expect("query failed")
        .expect("user missing")
}

async fn rewind_last_failure(shared: &SharedState, user_id: &str, minutes: i64) {
    let user = load_user(shared, user_id).await;
    let mut active: users::ActiveModel = user.into();
    active.last_failed_login = Set(Some(Utc::now() - Duration::minutes(minutes)));
    active.update(&shared.store.conn).await.expect("update failed");
}

async fn seed_failure_state(shared: &SharedState, user_id: &str, attempts: i32) {
    let user = load_user(shared, user_id).await;
    let mut active: users::ActiveModel = user.into();
    active.failed_login_attempts = Set(attempts);
    active.last_failed_login = Set(Some(Utc::now()));
    active.update(&shared.store.conn).await.expect("update failed");
}

async fn expire_otp(shared: &SharedState, user_id: &str) {
    let user = load_user(shared, user_id).await;
    let mut active: users::ActiveModel = user.into();
    active.otp_expiry = Set(Some(Utc::now() - Duration::seconds(1)));
    active.update(&shared.store.conn).await.expect("update failed");
}

// ============================================================================
// Lockout
// ============================================================================

#[tokio::test]
async fn three_wrong_passwords_lock_for_an_hour() {
    let (shared, _notifier) = spawn_state().await;
    create_user(&shared, "EMP001").await;
    let auth = &shared.auth_service;

    for expected_remaining in [2, 1, 2] {
        let err = auth.login("EMP001", "wrong-password").await.unwrap_err();
        match err {
            AuthError::InvalidCredentials { attempts_remaining } => {
                assert_eq!(attempts_remaining, expected_remaining);
            }
            other => panic!("expected InvalidCredentials, got {other:?}"),
        }
    }

    // Fourth attempt with the CORRECT password is still rejected.
    let err = auth.login("EMP001", TEST_PASSWORD).await.unwrap_err();
    match err {
        AuthError::AccountLocked { permanent, message } => {
            assert!(!permanent);
            assert!(message.contains("minutes"), "{message}");
        }
        other => panic!("expected AccountLocked, got {other:?}"),
    }

    // After the window has elapsed the correct password goes through and an
    // OTP challenge is issued.
    rewind_last_failure(&shared, "EMP001", 61).await;
    let challenge = auth.login("EMP001", TEST_PASSWORD).await.unwrap();
    assert_eq!(challenge.user_id, "EMP001");
    assert_eq!(challenge.masked_email, "emp***@college.edu");

    let user = load_user(&shared, "EMP001").await;
    assert_eq!(user.failed_login_attempts, 0);
    assert!(user.otp_code.is_some());
}

#[tokio::test]
async fn five_failures_report_a_six_hour_window() {
    let (shared, _notifier) = spawn_state().await;
    create_user(&shared, "EMP002").await;
    seed_failure_state(&shared, "EMP002", 5).await;

    let err = shared
        .auth_service
        .login("EMP002", TEST_PASSWORD)
        .await
        .unwrap_err();
    match err {
        AuthError::AccountLocked { permanent, message } => {
            assert!(!permanent);
            assert!(message.contains("5h"), "{message}");
        }
        other => panic!("expected AccountLocked, got {other:?}"),
    }
}

#[tokio::test]
async fn eight_failures_lock_permanently_without_a_login_attempt() {
    let (shared, _notifier) = spawn_state().await;
    create_user(&shared, "EMP003").await;
    seed_failure_state(&shared, "EMP003", 8).await;

    // The permanent transition is persisted by the evaluation itself.
    let err = shared
        .auth_service
        .login("EMP003", TEST_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { permanent: true, .. }));

    let user = load_user(&shared, "EMP003").await;
    assert!(user.permanent_lock);
    assert!(user.lock_reason.is_some());

    // No time-based reset clears it, even far in the future.
    rewind_last_failure(&shared, "EMP003", 60 * 24 * 30).await;
    let err = shared
        .auth_service
        .login("EMP003", TEST_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { permanent: true, .. }));

    // And reset_failed_attempts refuses to touch it.
    let repo = shared.store.users(&shared.config.security);
    let user = load_user(&shared, "EMP003").await;
    assert!(!repo.reset_failed_attempts(user).await.unwrap());
}

#[tokio::test]
async fn successful_login_resets_the_failure_counter() {
    let (shared, _notifier) = spawn_state().await;
    create_user(&shared, "EMP004").await;
    let auth = &shared.auth_service;

    for _ in 0..2 {
        let _ = auth.login("EMP004", "wrong-password").await.unwrap_err();
    }
    assert_eq!(load_user(&shared, "EMP004").await.failed_login_attempts, 2);

    auth.login("EMP004", TEST_PASSWORD).await.unwrap();
    assert_eq!(load_user(&shared, "EMP004").await.failed_login_attempts, 0);
}

#[tokio::test]
async fn reset_failed_attempts_is_idempotent() {
    let (shared, _notifier) = spawn_state().await;
    create_user(&shared, "EMP005").await;
    seed_failure_state(&shared, "EMP005", 2).await;

    let repo = shared.store.users(&shared.config.security);
    assert!(repo.reset_failed_attempts(load_user(&shared, "EMP005").await).await.unwrap());
    assert!(repo.reset_failed_attempts(load_user(&shared, "EMP005").await).await.unwrap());
    assert_eq!(load_user(&shared, "EMP005").await.failed_login_attempts, 0);
}

// ============================================================================
// OTP
// ============================================================================

#[tokio::test]
async fn expired_code_is_rejected_and_cleared() {
    let (shared, notifier) = spawn_state().await;
    create_user(&shared, "EMP010").await;
    let auth = &shared.auth_service;

    auth.login("EMP010", TEST_PASSWORD).await.unwrap();
    let code = notifier.last_code();

    expire_otp(&shared, "EMP010").await;
    let err = auth
        .verify_login_otp("EMP010", &code, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::OtpExpired));

    // The stored code was consumed by the expiry; a retry reports missing.
    let user = load_user(&shared, "EMP010").await;
    assert!(user.otp_code.is_none());
    let err = auth
        .verify_login_otp("EMP010", &code, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::OtpMissing));
}

#[tokio::test]
async fn attempt_budget_blocks_the_correct_code() {
    let (shared, notifier) = spawn_state().await;
    create_user(&shared, "EMP011").await;
    let auth = &shared.auth_service;

    auth.login("EMP011", TEST_PASSWORD).await.unwrap();
    let code = notifier.last_code();
    let wrong = if code == "000000" { "000001" } else { "000000" };

    for _ in 0..3 {
        let err = auth
            .verify_login_otp("EMP011", wrong, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpInvalid));
    }

    let err = auth
        .verify_login_otp("EMP011", &code, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::OtpAttemptsExhausted));
}

#[tokio::test]
async fn issuing_a_new_code_invalidates_the_previous_one() {
    let (shared, notifier) = spawn_state().await;
    create_user(&shared, "EMP012").await;
    let auth = &shared.auth_service;

    auth.login("EMP012", TEST_PASSWORD).await.unwrap();
    auth.login("EMP012", TEST_PASSWORD).await.unwrap();

    let codes = notifier.codes();
    let (code_a, code_b) = (&codes[codes.len() - 2], &codes[codes.len() - 1]);

    if code_a != code_b {
        let err = auth
            .verify_login_otp("EMP012", code_a, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpInvalid));
    }

    let authenticated = auth
        .verify_login_otp("EMP012", code_b, Some("10.0.0.9".to_string()))
        .await
        .unwrap();
    assert_eq!(authenticated.profile.user_id, "EMP012");
    assert_eq!(authenticated.tokens.access_token.len(), 64);

    let user = load_user(&shared, "EMP012").await;
    assert!(user.otp_code.is_none());
    assert_eq!(user.last_login_ip.as_deref(), Some("10.0.0.9"));
    assert!(user.last_login.is_some());
}

#[tokio::test]
async fn dispatch_failure_invalidates_the_generated_code() {
    let config = test_config();
    let shared = SharedState::with_collaborators(
        config,
        Arc::new(FailingNotifier),
        Arc::new(OpaqueTokenIssuer),
    )
    .await
    .unwrap();
    let shared = Arc::new(shared);
    create_user(&shared, "EMP013").await;

    let err = shared
        .auth_service
        .login("EMP013", TEST_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NotificationFailed));

    let user = load_user(&shared, "EMP013").await;
    assert!(user.otp_code.is_none());
    assert!(user.otp_expiry.is_none());
}

// ============================================================================
// Password history
// ============================================================================

#[tokio::test]
async fn last_five_passwords_cannot_be_reused() {
    let (shared, _notifier) = spawn_state().await;
    create_user(&shared, "EMP020").await;
    let repo = shared.store.users(&shared.config.security);
    let actor = Actor::user("EMP020");

    let passwords = ["RotA1!xx", "RotB2@yy", "RotC3#zz", "RotD4$ww", "RotE5%vv"];
    for password in passwords {
        let outcome = repo
            .set_password(load_user(&shared, "EMP020").await, password, &actor)
            .await
            .unwrap();
        assert_eq!(outcome, SetPasswordOutcome::Applied);
    }

    // All five retained passwords are rejected.
    for password in passwords {
        let outcome = repo
            .set_password(load_user(&shared, "EMP020").await, password, &actor)
            .await
            .unwrap();
        assert_eq!(outcome, SetPasswordOutcome::ReusedRecent);
    }

    // The creation password is the 6th-oldest now, purged from history.
    let outcome = repo
        .set_password(load_user(&shared, "EMP020").await, TEST_PASSWORD, &actor)
        .await
        .unwrap();
    assert_eq!(outcome, SetPasswordOutcome::Applied);
}

// ============================================================================
// Password reset flow
// ============================================================================

#[tokio::test]
async fn full_reset_flow_allows_login_with_the_new_password() {
    let (shared, notifier) = spawn_state().await;
    create_user(&shared, "EMP030").await;
    let auth = &shared.auth_service;

    auth.request_password_reset("EMP030").await.unwrap();
    let code = notifier.last_code();

    auth.verify_reset_otp("EMP030", &code).await.unwrap();

    auth.complete_password_reset("EMP030", &code, "NewPass1!")
        .await
        .unwrap();

    let user = load_user(&shared, "EMP030").await;
    assert!(user.otp_code.is_none());
    assert!(!user.otp_verified);
    assert_eq!(user.failed_login_attempts, 0);

    // Old password is gone, the new one proceeds to the OTP stage.
    let err = auth.login("EMP030", TEST_PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials { .. }));
    let challenge = auth.login("EMP030", "NewPass1!").await.unwrap();
    assert_eq!(challenge.user_id, "EMP030");
}

#[tokio::test]
async fn reuse_rejection_does_not_consume_the_reset_code() {
    let (shared, notifier) = spawn_state().await;
    create_user(&shared, "EMP031").await;
    let auth = &shared.auth_service;

    auth.request_password_reset("EMP031").await.unwrap();
    let code = notifier.last_code();
    auth.verify_reset_otp("EMP031", &code).await.unwrap();

    // Same as the current password: rejected before the OTP is consumed.
    let err = auth
        .complete_password_reset("EMP031", &code, TEST_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PasswordReuse));

    // A retry with a different password inside the window still succeeds.
    auth.complete_password_reset("EMP031", &code, "Fresh9@pw")
        .await
        .unwrap();
}

#[tokio::test]
async fn stale_confirmation_cannot_reuse_a_replaced_code() {
    let (shared, notifier) = spawn_state().await;
    create_user(&shared, "EMP032").await;
    let auth = &shared.auth_service;

    auth.request_password_reset("EMP032").await.unwrap();
    let old_code = notifier.last_code();
    auth.verify_reset_otp("EMP032", &old_code).await.unwrap();

    // A newer request replaces the code; the old confirmation must fail even
    // though `otp_verified` was set.
    auth.request_password_reset("EMP032").await.unwrap();
    let new_code = notifier.last_code();

    if old_code != new_code {
        let err = auth
            .complete_password_reset("EMP032", &old_code, "Fresh9@pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OtpInvalid));
    }

    auth.complete_password_reset("EMP032", &new_code, "Fresh9@pw")
        .await
        .unwrap();
}

// ============================================================================
// Lifecycle & audit
// ============================================================================

#[tokio::test]
async fn soft_deleted_users_cannot_log_in_and_leave_an_audit_trail() {
    let (shared, _notifier) = spawn_state().await;
    let user = create_user(&shared, "EMP040").await;
    let repo = shared.store.users(&shared.config.security);

    repo.soft_delete(user, &Actor::user("ADMIN001")).await.unwrap();

    let err = shared
        .auth_service
        .login("EMP040", TEST_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UserNotFound));

    let trail = shared.store.audit().user_trail("EMP040").await.unwrap();
    let actions: Vec<&str> = trail.iter().map(|r| r.action.as_str()).collect();
    assert!(actions.contains(&"DELETE"));
    assert!(actions.contains(&"INSERT"));

    let delete_record = trail.iter().find(|r| r.action == "DELETE").unwrap();
    assert_eq!(delete_record.action_by, "ADMIN001");
    let old_data = delete_record.old_data.as_ref().unwrap();
    assert!(old_data.get("password_hash").is_none());
    assert!(old_data.get("username").is_some());
}

#[tokio::test]
async fn admin_unlock_clears_a_permanent_lock() {
    let (shared, _notifier) = spawn_state().await;
    create_user(&shared, "EMP041").await;
    seed_failure_state(&shared, "EMP041", 8).await;

    // Trip the permanent transition.
    let _ = shared
        .auth_service
        .login("EMP041", TEST_PASSWORD)
        .await
        .unwrap_err();
    assert!(load_user(&shared, "EMP041").await.permanent_lock);

    let repo = shared.store.users(&shared.config.security);
    repo.admin_unlock(load_user(&shared, "EMP041").await, &Actor::System)
        .await
        .unwrap();

    let user = load_user(&shared, "EMP041").await;
    assert!(!user.permanent_lock);
    assert_eq!(user.failed_login_attempts, 0);

    shared
        .auth_service
        .login("EMP041", TEST_PASSWORD)
        .await
        .unwrap();
}

use axum::{Json, extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::validation::{validate_identifier, validate_otp, validate_password};
use super::{ApiError, ApiResponse, AppState};
use crate::services::{AuthError, AuthenticatedUser, LoginChallenge};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct OtpChallengeResponse {
    pub user_id: String,
    /// Masked: first 3 characters of the local part plus the domain.
    pub email: String,
    pub otp_sent: bool,
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub user_id: String,
    pub otp: String,
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub user_id: String,
}

#[derive(Deserialize)]
pub struct CompleteResetRequest {
    pub user_id: String,
    pub otp: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct ResetOtpVerification {
    pub verified: bool,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl From<LoginChallenge> for OtpChallengeResponse {
    fn from(challenge: LoginChallenge) -> Self {
        Self {
            user_id: challenge.user_id,
            email: challenge.masked_email,
            otp_sent: true,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/login
/// Step 1 of the login flow: password check and OTP dispatch.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<OtpChallengeResponse>>, ApiError> {
    let user_id = validate_identifier(&payload.user_id)?;
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let challenge = state
        .auth()
        .login(user_id, &payload.password)
        .await
        .map_err(|err| match err {
            // A missing user reads the same as a wrong password here, so the
            // endpoint cannot be used to enumerate accounts.
            AuthError::UserNotFound => {
                ApiError::Unauthorized("Invalid credentials".to_string())
            }
            other => ApiError::from(other),
        })?;

    Ok(Json(ApiResponse::success(challenge.into())))
}

/// POST /api/auth/verify-otp
/// Step 2 of the login flow: verify the emailed code, issue the token pair.
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<ApiResponse<AuthenticatedUser>>, ApiError> {
    let user_id = validate_identifier(&payload.user_id)?;
    let otp = validate_otp(&payload.otp)?;

    let authenticated = state
        .auth()
        .verify_login_otp(user_id, otp, client_ip(&headers))
        .await?;

    Ok(Json(ApiResponse::success(authenticated)))
}

/// POST /api/auth/password-reset/request
pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<Json<ApiResponse<OtpChallengeResponse>>, ApiError> {
    let user_id = validate_identifier(&payload.user_id)?;

    let challenge = state.auth().request_password_reset(user_id).await?;

    Ok(Json(ApiResponse::success(challenge.into())))
}

/// POST /api/auth/password-reset/verify
/// Checks the reset code while keeping it valid for the completion step.
pub async fn verify_reset_otp(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<ApiResponse<ResetOtpVerification>>, ApiError> {
    let user_id = validate_identifier(&payload.user_id)?;
    let otp = validate_otp(&payload.otp)?;

    state.auth().verify_reset_otp(user_id, otp).await?;

    Ok(Json(ApiResponse::success(ResetOtpVerification {
        verified: true,
    })))
}

/// POST /api/auth/password-reset/complete
pub async fn complete_password_reset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CompleteResetRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let user_id = validate_identifier(&payload.user_id)?;
    let otp = validate_otp(&payload.otp)?;
    let new_password = validate_password(&payload.new_password)?;

    state
        .auth()
        .complete_password_reset(user_id, otp, new_password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password reset successful".to_string(),
    })))
}

// ============================================================================
// Helpers
// ============================================================================

/// Client address from forwarding headers, if a proxy supplied one.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("X-Forwarded-For")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }

    headers
        .get("X-Real-Ip")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

use std::sync::LazyLock;

use regex::Regex;

use super::ApiError;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid")
});

pub fn validate_identifier(identifier: &str) -> Result<&str, ApiError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("user_id is required"));
    }
    if trimmed.len() > 20 {
        return Err(ApiError::validation("user_id must be 20 characters or less"));
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::validation(
            "user_id can only contain letters and digits",
        ));
    }
    Ok(trimmed)
}

pub fn validate_otp(otp: &str) -> Result<&str, ApiError> {
    let trimmed = otp.trim();
    if trimmed.len() != 6 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::validation("OTP must be exactly 6 digits"));
    }
    Ok(trimmed)
}

/// Password rules for new credentials: at least 8 characters with one lower,
/// one upper, one digit and one special character.
pub fn validate_password(password: &str) -> Result<&str, ApiError> {
    if password.len() < 8 {
        return Err(ApiError::validation(
            "Password must be at least 8 characters",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::validation(
            "Password must contain a lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::validation(
            "Password must contain an uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::validation("Password must contain a digit"));
    }
    if password.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::validation(
            "Password must contain a special character",
        ));
    }
    Ok(password)
}

pub fn validate_email(email: &str) -> Result<&str, ApiError> {
    let trimmed = email.trim();
    if !EMAIL_RE.is_match(trimmed) {
        return Err(ApiError::validation("Invalid email address"));
    }
    Ok(trimmed)
}

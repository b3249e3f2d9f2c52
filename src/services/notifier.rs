//! Out-of-band message delivery.
//!
//! The workflow only knows "send message to address"; transport (SMTP, an
//! external relay, a queue) lives behind the trait. Message bodies are built
//! here so the templates stay next to the flows that use them. Bodies carry
//! OTP codes, so they are never logged.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::domain::otp::DEFAULT_TTL_MINUTES;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to_address: &str, subject: &str, body: &str) -> Result<()>;
}

/// Development notifier: records that a delivery happened without exposing
/// the body.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to_address: &str, subject: &str, _body: &str) -> Result<()> {
        info!("Dispatched '{subject}' to {to_address}");
        Ok(())
    }
}

/// Subject and body for the login verification mail.
#[must_use]
pub fn login_otp_message(first_name: &str, code: &str) -> (String, String) {
    (
        "Login OTP - College ERP".to_string(),
        format!(
            "Dear {first_name},\n\n\
             Your OTP for login is: {code}\n\
             This OTP will expire in {DEFAULT_TTL_MINUTES} minutes.\n\n\
             If you did not request this OTP, please ignore this email.\n\n\
             Best regards,\n\
             College ERP Team"
        ),
    )
}

/// Subject and body for the password reset mail.
#[must_use]
pub fn reset_otp_message(code: &str) -> (String, String) {
    (
        "Password Reset OTP".to_string(),
        format!("Your OTP for password reset is: {code}"),
    )
}

/// Subject and body for newly created account credentials.
#[must_use]
pub fn credentials_message(
    user_id: &str,
    username: &str,
    password: &str,
    frontend_url: &str,
) -> (String, String) {
    (
        "Your College ERP Account Credentials".to_string(),
        format!(
            "Welcome to College ERP!\n\n\
             Your account has been created with the following credentials:\n\n\
             User ID: {user_id}\n\
             Username: {username}\n\
             Password: {password}\n\n\
             Please login at: {frontend_url}/login\n\n\
             For security reasons, please change your password after first login.\n\n\
             Note: This is a system generated email. Please do not reply."
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_message_carries_code_and_expiry() {
        let (subject, body) = login_otp_message("Priya", "123456");
        assert_eq!(subject, "Login OTP - College ERP");
        assert!(body.contains("Dear Priya"));
        assert!(body.contains("123456"));
        assert!(body.contains("3 minutes"));
    }

    #[test]
    fn credentials_message_includes_login_url() {
        let (_, body) = credentials_message("EMP2025A001", "priya", "s3cret", "https://erp.example");
        assert!(body.contains("https://erp.example/login"));
        assert!(body.contains("EMP2025A001"));
    }
}

//! Session token issuance.
//!
//! Login step 2 delegates to a [`TokenIssuer`]; the artifact itself is opaque
//! to the workflow. The bundled implementation mints random bearer tokens;
//! deployments fronted by an SSO gateway can swap in their own issuer.

use anyhow::Result;
use serde::Serialize;

use crate::domain::Permissions;

/// Claims embedded in an issued session, resolved once at login.
#[derive(Debug, Clone, Serialize)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub is_superuser: bool,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub trait TokenIssuer: Send + Sync {
    fn issue(&self, claims: &Claims) -> Result<TokenPair>;
}

/// Issues unguessable random bearer tokens (64-char hex access token plus a
/// UUID-keyed refresh token).
pub struct OpaqueTokenIssuer;

impl TokenIssuer for OpaqueTokenIssuer {
    fn issue(&self, _claims: &Claims) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: random_token(),
            refresh_token: uuid::Uuid::new_v4().simple().to_string(),
        })
    }
}

/// Random 64-character hex string.
fn random_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> Claims {
        Claims {
            user_id: "EMP2025A001".to_string(),
            username: "priya".to_string(),
            is_superuser: false,
            permissions: Permissions::new(),
        }
    }

    #[test]
    fn tokens_are_well_formed_and_unique() {
        let issuer = OpaqueTokenIssuer;
        let a = issuer.issue(&claims()).unwrap();
        let b = issuer.issue(&claims()).unwrap();

        assert_eq!(a.access_token.len(), 64);
        assert!(a.access_token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.access_token, b.access_token);
        assert_ne!(a.refresh_token, b.refresh_token);
    }
}

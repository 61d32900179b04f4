//! Bearer token claims
//!
//! Tokens are issued and verified upstream (API gateway); this service only
//! reads the subject and role claims out of the payload segment.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use thiserror::Error;

/// Role that unlocks the administrative routes
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not a JWT")]
    Malformed,
    #[error("token payload is not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("token payload is not valid claims JSON: {0}")]
    Claims(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RealmAccess {
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Claims {
    pub sub: String,
    pub realm_access: RealmAccess,
    pub groups: Vec<String>,
}

impl Claims {
    /// Decodes the claims of a (possibly `Bearer `-prefixed) JWT
    pub fn parse(token: &str) -> Result<Self, TokenError> {
        let mut segments = strip_bearer(token).split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_)) => payload,
            _ => return Err(TokenError::Malformed),
        };

        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn roles(&self) -> &[String] {
        &self.realm_access.roles
    }

    pub fn is_admin(&self) -> bool {
        self.roles().iter().any(|r| r == ADMIN_ROLE)
    }
}

/// Removes a leading `Bearer ` scheme, case-insensitively
pub fn strip_bearer(token: &str) -> &str {
    let token = token.trim();
    match token.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer ") => token[7..].trim_start(),
        _ => token,
    }
}

/// Builds an unsigned token carrying the given claims, for tests
#[cfg(test)]
pub fn test_token(sub: &str, roles: &[&str]) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = serde_json::json!({
        "sub": sub,
        "realm_access": { "roles": roles },
    });
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("Bearer {header}.{payload}.")
}

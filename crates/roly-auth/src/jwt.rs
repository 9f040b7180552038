//! Bearer extraction and HS256 token validation.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AuthError;

/// Identity claims carried by a session token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated user.
    pub user_id: String,
    /// User e-mail at issue time.
    pub email: String,
    /// Expiry (seconds since the Unix epoch).
    pub exp: u64,
    /// Issued-at (seconds since the Unix epoch).
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: String,
}

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeaderFormat)?;
    if value.is_empty() {
        return Err(AuthError::MissingHeader);
    }

    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthError::InvalidHeaderFormat)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::InvalidHeaderFormat);
    }
    Ok(token)
}

/// Verifies HS256 tokens against a shared secret and expected issuer.
#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("issuer", &self.validation.iss)
            .finish_non_exhaustive()
    }
}

impl JwtValidator {
    /// Create a validator for `secret`, requiring `iss == issuer`.
    pub fn new(secret: &str, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.leeway = 0;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Check signature, expiry and issuer; return the claims.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(data.claims)
    }

    /// Validate the bearer token presented on an upgrade request.
    pub fn validate_handshake(&self, headers: &HeaderMap) -> Result<Claims, AuthError> {
        let token = extract_bearer_token(headers)?;
        let claims = self.validate(token)?;
        debug!(user_id = %claims.user_id, "handshake token accepted");
        Ok(claims)
    }
}

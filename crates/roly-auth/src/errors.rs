//! Auth error types.

/// Errors produced while checking handshake credentials.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization` header was sent.
    #[error("no Authorization header provided")]
    MissingHeader,

    /// The header is not `Bearer <token>`.
    #[error("invalid Authorization header format")]
    InvalidHeaderFormat,

    /// The token's `exp` is in the past.
    #[error("token expired")]
    Expired,

    /// Signature, issuer, or structure check failed.
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::InvalidToken(err.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_header_display() {
        assert_eq!(
            AuthError::MissingHeader.to_string(),
            "no Authorization header provided"
        );
    }

    #[test]
    fn invalid_token_display() {
        let err = AuthError::InvalidToken("InvalidSignature".to_string());
        assert!(err.to_string().contains("InvalidSignature"));
    }

    #[test]
    fn expired_signature_maps_to_expired() {
        let err: AuthError =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::ExpiredSignature)
                .into();
        assert!(matches!(err, AuthError::Expired));
    }

    #[test]
    fn other_jwt_errors_map_to_invalid() {
        let err: AuthError =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidSignature)
                .into();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }
}

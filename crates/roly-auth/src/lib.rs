//! # roly-auth
//!
//! Credential check for WebSocket upgrade requests.
//!
//! Extracts `Authorization: Bearer <token>` and verifies an HS256 JWT
//! (signature, expiry, issuer). The server calls it only when the handshake
//! policy is `bearer`; the default policy leaves the upgrade open.

#![deny(unsafe_code)]

pub mod errors;
pub mod jwt;

pub use errors::AuthError;
pub use jwt::{Claims, JwtValidator, extract_bearer_token};

//! `GET /ws`: origin gate, optional bearer check, then protocol upgrade.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use roly_auth::{AuthError, Claims, JwtValidator};
use roly_settings::HandshakeAuth;
use tracing::{debug, info, warn};

use super::frame::split_socket;
use super::origin::{OriginValidator, origin_header};
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::metrics::WS_HANDSHAKE_REJECTIONS_TOTAL;
use crate::server::AppState;

/// Gates applied before an upgrade is accepted.
#[derive(Clone, Debug)]
pub struct HandshakePolicy {
    origins: OriginValidator,
    jwt: Option<JwtValidator>,
}

impl HandshakePolicy {
    /// Origin check only.
    pub fn open(origins: OriginValidator) -> Self {
        Self { origins, jwt: None }
    }

    /// Origin check plus a valid bearer token.
    pub fn bearer(origins: OriginValidator, jwt: JwtValidator) -> Self {
        Self {
            origins,
            jwt: Some(jwt),
        }
    }

    /// Build from server configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let origins = OriginValidator::new(config.allowed_origins.iter().cloned());
        match config.handshake_auth {
            HandshakeAuth::Open => Ok(Self::open(origins)),
            HandshakeAuth::Bearer => {
                let secret = config
                    .jwt_secret
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or(ServerError::MissingJwtSecret)?;
                Ok(Self::bearer(
                    origins,
                    JwtValidator::new(secret, &config.jwt_issuer),
                ))
            }
        }
    }

    /// Whether a bearer token is required.
    pub fn requires_token(&self) -> bool {
        self.jwt.is_some()
    }
}

/// Why an upgrade request was refused.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeRejection {
    /// `Origin` missing or not on the allow-list.
    #[error("origin not allowed: {0:?}")]
    OriginNotAllowed(Option<String>),
    /// Bearer policy on and the token was missing or invalid.
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),
}

impl HandshakeRejection {
    /// HTTP status returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::OriginNotAllowed(_) => "origin",
            Self::Unauthorized(_) => "credentials",
        }
    }
}

impl IntoResponse for HandshakeRejection {
    fn into_response(self) -> Response {
        let status = self.status();
        // No detail crosses the wire.
        (status, status.canonical_reason().unwrap_or_default()).into_response()
    }
}

/// Run the handshake gates against request headers.
///
/// Returns the token claims when the bearer policy is on.
pub fn check_handshake(
    headers: &HeaderMap,
    policy: &HandshakePolicy,
) -> Result<Option<Claims>, HandshakeRejection> {
    if !policy.origins.allows_request(headers) {
        return Err(HandshakeRejection::OriginNotAllowed(
            origin_header(headers).map(str::to_owned),
        ));
    }
    match &policy.jwt {
        Some(jwt) => Ok(Some(jwt.validate_handshake(headers)?)),
        None => Ok(None),
    }
}

/// Upgrade handler. Nothing is allocated until every gate passes.
pub async fn ws_handler(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let claims = match check_handshake(&headers, &state.handshake) {
        Ok(claims) => claims,
        Err(rejection) => {
            counter!(WS_HANDSHAKE_REJECTIONS_TOTAL, "reason" => rejection.reason()).increment(1);
            info!(reason = rejection.reason(), error = %rejection, "websocket handshake rejected");
            return rejection.into_response();
        }
    };

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(error = %rejection, "malformed upgrade request");
            return rejection.into_response();
        }
    };

    let origin = origin_header(&headers).map(str::to_owned);
    let launcher = state.launcher.clone();
    ws.max_message_size(state.max_message_size)
        .on_failed_upgrade(|err| warn!(error = %err, "websocket upgrade failed"))
        .on_upgrade(move |socket| async move {
            let (sink, stream) = split_socket(socket);
            let _ = launcher.launch(sink, stream, origin, claims);
        })
}

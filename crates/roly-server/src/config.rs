//! Server configuration.

use std::time::Duration;

use roly_settings::{HandshakeAuth, RolySettings};

/// Per-connection lifecycle tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Rolling read deadline; a peer silent for this long is disconnected.
    pub read_deadline: Duration,
    /// Bound on a single transport write, and on the close during cleanup.
    pub write_deadline: Duration,
    /// Outbound queue capacity.
    pub outbound_capacity: usize,
    /// Log every inbound and outbound frame at debug level.
    pub debug_frames: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_deadline: Duration::from_secs(60),
            write_deadline: Duration::from_secs(10),
            outbound_capacity: 10,
            debug_frames: false,
        }
    }
}

/// Configuration for the Roly server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Exact-match `Origin` allow-list.
    pub allowed_origins: Vec<String>,
    /// Upgrade credential policy.
    pub handshake_auth: HandshakeAuth,
    /// HS256 secret, required for [`HandshakeAuth::Bearer`].
    pub jwt_secret: Option<String>,
    /// Expected token issuer.
    pub jwt_issuer: String,
    /// Connection lifecycle tuning.
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 1024 * 1024,
            allowed_origins: vec!["https://roly.ai".into(), "http://localhost:3000".into()],
            handshake_auth: HandshakeAuth::Open,
            jwt_secret: None,
            jwt_issuer: "roly-backend".into(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Build from resolved settings.
    pub fn from_settings(settings: &RolySettings) -> Self {
        let ws = &settings.websocket;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            allowed_origins: ws.allowed_origins.clone(),
            handshake_auth: ws.handshake_auth,
            jwt_secret: settings.auth.jwt_secret.clone(),
            jwt_issuer: settings.auth.issuer.clone(),
            connection: ConnectionConfig {
                read_deadline: Duration::from_millis(ws.read_deadline_ms),
                write_deadline: Duration::from_millis(ws.write_deadline_ms),
                outbound_capacity: ws.outbound_capacity,
                debug_frames: ws.debug_frames,
            },
        }
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

//! Settings types.
//!
//! Every struct uses `#[serde(default)]` so a partial settings file only has
//! to name the keys it changes.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Deployment environment, selected by `APP_ENV`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnv {
    /// Local development (verbose logging, frame tracing on).
    #[default]
    Development,
    /// Production deployment.
    Production,
}

impl AppEnv {
    /// Parse an `APP_ENV` value. Anything other than `production` is development.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }

    /// Name of the settings file for this environment.
    pub fn settings_file_name(self) -> &'static str {
        match self {
            Self::Development => "settings.development.json",
            Self::Production => "settings.production.json",
        }
    }

    /// Lowercase label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Root settings object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RolySettings {
    /// Environment these settings were resolved for.
    pub app_env: AppEnv,
    /// Listener settings.
    pub server: ServerSettings,
    /// Connection lifecycle settings.
    pub websocket: WebSocketSettings,
    /// Handshake credential settings.
    pub auth: AuthSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl Default for RolySettings {
    fn default() -> Self {
        Self::for_env(AppEnv::Development)
    }
}

impl RolySettings {
    /// Compiled defaults for the given environment.
    pub fn for_env(app_env: AppEnv) -> Self {
        let production = app_env == AppEnv::Production;
        Self {
            app_env,
            server: ServerSettings::default(),
            websocket: WebSocketSettings {
                debug_frames: !production,
                ..WebSocketSettings::default()
            },
            auth: AuthSettings::default(),
            logging: LoggingSettings {
                level: if production { "info" } else { "debug" }.to_string(),
                ..LoggingSettings::default()
            },
        }
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let ws = &self.websocket;
        if ws.allowed_origins.iter().all(|o| o.trim().is_empty()) {
            return Err(SettingsError::invalid(
                "websocket.allowedOrigins",
                "must contain at least one origin",
            ));
        }
        if ws.read_deadline_ms == 0 {
            return Err(SettingsError::invalid("websocket.readDeadlineMs", "must be > 0"));
        }
        if ws.write_deadline_ms == 0 {
            return Err(SettingsError::invalid("websocket.writeDeadlineMs", "must be > 0"));
        }
        if ws.outbound_capacity == 0 {
            return Err(SettingsError::invalid("websocket.outboundCapacity", "must be > 0"));
        }
        if ws.handshake_auth == HandshakeAuth::Bearer
            && self.auth.jwt_secret.as_deref().is_none_or(str::is_empty)
        {
            return Err(SettingsError::invalid(
                "auth.jwtSecret",
                "required for bearer handshake auth (or set JWT_SECRET)",
            ));
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Largest accepted inbound message in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Whether the upgrade endpoint requires a bearer token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeAuth {
    /// Any allow-listed origin may upgrade.
    #[default]
    Open,
    /// A valid `Authorization: Bearer <jwt>` header is also required.
    Bearer,
}

impl HandshakeAuth {
    /// Parse a policy name (`open` / `bearer`, case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "bearer" => Some(Self::Bearer),
            _ => None,
        }
    }
}

/// Connection lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebSocketSettings {
    /// Exact-match `Origin` allow-list.
    pub allowed_origins: Vec<String>,
    /// Rolling read deadline in milliseconds.
    pub read_deadline_ms: u64,
    /// Per-send write deadline in milliseconds.
    pub write_deadline_ms: u64,
    /// Outbound queue capacity per connection.
    pub outbound_capacity: usize,
    /// Log every inbound/outbound frame at debug level.
    pub debug_frames: bool,
    /// Upgrade credential policy.
    pub handshake_auth: HandshakeAuth,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "https://roly.ai".to_string(),
                "http://localhost:3000".to_string(),
            ],
            read_deadline_ms: 60_000,
            write_deadline_ms: 10_000,
            outbound_capacity: 10,
            debug_frames: true,
            handshake_auth: HandshakeAuth::Open,
        }
    }
}

/// Handshake credential settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HMAC secret for HS256 tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    /// Expected `iss` claim.
    pub issuer: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            issuer: "roly-backend".to_string(),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable single-line output.
    Compact,
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RolySettings::for_env`] defaults for `APP_ENV`
//! 2. If the environment's settings file exists, deep-merge it over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{AppEnv, HandshakeAuth, LogFormat, RolySettings};

/// Resolve the configuration directory (`$ROLY_CONFIG_DIR` or `~/.roly`).
pub fn config_dir() -> PathBuf {
    if let Some(dir) = read_env_string("ROLY_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".roly")
}

/// Path of the settings file for an environment.
pub fn settings_path(app_env: AppEnv) -> PathBuf {
    config_dir().join(app_env.settings_file_name())
}

/// Resolve `APP_ENV` from the process environment.
pub fn current_app_env() -> AppEnv {
    AppEnv::from_env_value(std::env::var("APP_ENV").ok().as_deref())
}

/// Load settings for the current `APP_ENV` from the default path.
pub fn load_settings() -> Result<RolySettings> {
    let app_env = current_app_env();
    load_settings_from_path(&settings_path(app_env), app_env)
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path, app_env: AppEnv) -> Result<RolySettings> {
    let mut settings = load_file_layer(path, app_env)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults merged with the settings file, without env overrides.
pub fn load_file_layer(path: &Path, app_env: AppEnv) -> Result<RolySettings> {
    let malformed = |source| SettingsError::Malformed {
        path: path.to_path_buf(),
        source,
    };
    let defaults = serde_json::to_value(RolySettings::for_env(app_env)).map_err(malformed)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(malformed)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RolySettings = serde_json::from_value(merged).map_err(malformed)?;
    settings.app_env = app_env;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut RolySettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_overrides(settings: &mut RolySettings, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = get("ROLY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = parsed(&get, "ROLY_PORT", |v| parse_u16_range(v, 0, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = parsed(&get, "ROLY_MAX_MESSAGE_SIZE", |v| {
        parse_usize_range(v, 1024, 64 * 1024 * 1024)
    }) {
        settings.server.max_message_size = v;
    }

    // ── WebSocket ───────────────────────────────────────────────────
    if let Some(v) = get("ROLY_ALLOWED_ORIGINS") {
        let origins = parse_list(&v);
        if origins.is_empty() {
            tracing::warn!(key = "ROLY_ALLOWED_ORIGINS", "empty origin list, ignoring");
        } else {
            settings.websocket.allowed_origins = origins;
        }
    }
    if let Some(v) = parsed(&get, "ROLY_READ_DEADLINE_MS", |v| {
        parse_u64_range(v, 100, 3_600_000)
    }) {
        settings.websocket.read_deadline_ms = v;
    }
    if let Some(v) = parsed(&get, "ROLY_WRITE_DEADLINE_MS", |v| {
        parse_u64_range(v, 100, 600_000)
    }) {
        settings.websocket.write_deadline_ms = v;
    }
    if let Some(v) = parsed(&get, "ROLY_OUTBOUND_CAPACITY", |v| {
        parse_usize_range(v, 1, 65_536)
    }) {
        settings.websocket.outbound_capacity = v;
    }
    if let Some(v) = parsed(&get, "ROLY_DEBUG_FRAMES", parse_bool) {
        settings.websocket.debug_frames = v;
    }
    if let Some(v) = parsed(&get, "ROLY_HANDSHAKE_AUTH", HandshakeAuth::parse) {
        settings.websocket.handshake_auth = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = get("JWT_SECRET") {
        settings.auth.jwt_secret = Some(v);
    }
    if let Some(v) = get("ROLY_JWT_ISSUER") {
        settings.auth.issuer = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = get("ROLY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = parsed(&get, "ROLY_LOG_FORMAT", parse_log_format) {
        settings.logging.format = v;
    }
}

fn parsed<T>(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = get(name)?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a log format name.
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "compact" | "text" => Some(LogFormat::Compact),
        _ => None,
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "server": {"port": 8080, "host": "localhost"}
        });
        let source = serde_json::json!({
            "server": {"port": 9090}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"origins": ["a", "b", "c"]});
        let source = serde_json::json!({"origins": ["d"]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["origins"], serde_json::json!(["d"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_file_layer ─────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/settings.development.json");
        let settings = load_file_layer(path, AppEnv::Development).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.websocket.outbound_capacity, 10);
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.development.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "websocket": {"readDeadlineMs": 5000}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path, AppEnv::Development).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.websocket.read_deadline_ms, 5000);
        assert_eq!(settings.websocket.write_deadline_ms, 10_000);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn file_origins_replace_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.production.json");
        std::fs::write(
            &path,
            r#"{"websocket": {"allowedOrigins": ["https://app.roly.ai"]}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path, AppEnv::Production).unwrap();
        assert_eq!(settings.websocket.allowed_origins, vec!["https://app.roly.ai"]);
        assert!(!settings.websocket.debug_frames);
    }

    #[test]
    fn file_cannot_change_app_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.production.json");
        std::fs::write(&path, r#"{"appEnv": "development"}"#).unwrap();

        let settings = load_file_layer(&path, AppEnv::Production).unwrap();
        assert_eq!(settings.app_env, AppEnv::Production);
    }

    #[test]
    fn invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_file_layer(&path, AppEnv::Development);
        assert!(matches!(
            result.unwrap_err(),
            SettingsError::Malformed { path: p, .. } if p == path
        ));
    }

    // ── apply_overrides ─────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut s = RolySettings::default();
        apply_overrides(
            &mut s,
            lookup(&[
                ("ROLY_PORT", "3001"),
                ("ROLY_ALLOWED_ORIGINS", "https://a.test, https://b.test,"),
                ("ROLY_READ_DEADLINE_MS", "2500"),
                ("ROLY_OUTBOUND_CAPACITY", "32"),
                ("ROLY_DEBUG_FRAMES", "off"),
                ("ROLY_HANDSHAKE_AUTH", "bearer"),
                ("JWT_SECRET", "topsecret"),
                ("ROLY_LOG_FORMAT", "compact"),
            ]),
        );
        assert_eq!(s.server.port, 3001);
        assert_eq!(
            s.websocket.allowed_origins,
            vec!["https://a.test", "https://b.test"]
        );
        assert_eq!(s.websocket.read_deadline_ms, 2500);
        assert_eq!(s.websocket.outbound_capacity, 32);
        assert!(!s.websocket.debug_frames);
        assert_eq!(s.websocket.handshake_auth, HandshakeAuth::Bearer);
        assert_eq!(s.auth.jwt_secret.as_deref(), Some("topsecret"));
        assert_eq!(s.logging.format, LogFormat::Compact);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut s = RolySettings::default();
        apply_overrides(
            &mut s,
            lookup(&[
                ("ROLY_PORT", "not-a-port"),
                ("ROLY_OUTBOUND_CAPACITY", "0"),
                ("ROLY_DEBUG_FRAMES", "maybe"),
                ("ROLY_HANDSHAKE_AUTH", "kerberos"),
                ("ROLY_ALLOWED_ORIGINS", " , "),
            ]),
        );
        let defaults = RolySettings::default();
        assert_eq!(s.server.port, defaults.server.port);
        assert_eq!(s.websocket.outbound_capacity, 10);
        assert!(s.websocket.debug_frames);
        assert_eq!(s.websocket.handshake_auth, HandshakeAuth::Open);
        assert_eq!(s.websocket.allowed_origins, defaults.websocket.allowed_origins);
    }

    #[test]
    fn empty_values_are_ignored() {
        let mut s = RolySettings::default();
        apply_overrides(&mut s, lookup(&[("ROLY_HOST", ""), ("JWT_SECRET", "")]));
        assert_eq!(s.server.host, "0.0.0.0");
        assert!(s.auth.jwt_secret.is_none());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("65535", 1, 65535), Some(65535));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_usize_range("20000", 1, 10_000), None);
        assert_eq!(parse_usize_range("abc", 1, 10_000), None);
    }

    #[test]
    fn parse_list_trims() {
        assert_eq!(parse_list(" a ,b,, c "), vec!["a", "b", "c"]);
        assert!(parse_list(",,").is_empty());
    }

    #[test]
    fn parse_log_format_names() {
        assert_eq!(parse_log_format("JSON"), Some(LogFormat::Json));
        assert_eq!(parse_log_format("text"), Some(LogFormat::Compact));
        assert_eq!(parse_log_format("xml"), None);
    }
}

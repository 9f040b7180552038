//! # roly-settings
//!
//! Layered configuration for the Roly WebSocket backend.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RolySettings::for_env`]
//! 2. **Settings file**: `<config dir>/settings.<APP_ENV>.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ROLY_*` and `JWT_SECRET` overrides (highest priority)
//!
//! Settings are resolved once at startup and handed to the server by value.
//! There is no global instance and no runtime reload.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, current_app_env, deep_merge, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::*;

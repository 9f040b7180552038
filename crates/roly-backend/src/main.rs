//! # roly-backend
//!
//! Roly WebSocket backend binary. Resolves settings, installs logging and
//! metrics, then serves `/ws`, `/health` and `/metrics` until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use roly_server::config::ServerConfig;
use roly_server::server::RolyServer;
use roly_server::websocket::handler::EchoHandler;
use roly_settings::RolySettings;

/// Roly WebSocket backend.
#[derive(Parser, Debug)]
#[command(name = "roly-backend", about = "Roly WebSocket backend")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file to load instead of `~/.roly/settings.<APP_ENV>.json`.
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Settings from file and environment, then CLI flags on top.
    fn resolve_settings(&self) -> Result<RolySettings> {
        let mut settings = match &self.settings {
            Some(path) => {
                roly_settings::load_settings_from_path(path, roly_settings::current_app_env())
                    .with_context(|| format!("Failed to load settings: {}", path.display()))?
            }
            None => roly_settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let _ = dotenvy::from_filename(".env.secrets");

    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;

    roly_logging::init_subscriber(&settings.logging);

    let metrics_handle = roly_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = ServerConfig::from_settings(&settings);
    let server = RolyServer::new(config, Arc::new(EchoHandler), metrics_handle)
        .context("Failed to build server")?;

    let (addr, serve_handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        "server started in {} mode, listening on {addr}",
        settings.app_env.as_str()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutting down...");

    let registry = server.registry().clone();
    let drain_handle = tokio::spawn(async move { registry.wait_empty().await });
    server
        .shutdown()
        .graceful_shutdown(vec![serve_handle, drain_handle], None)
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}

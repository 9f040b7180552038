//! `RolyServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::MessageHandler;
use crate::websocket::lifecycle::ConnectionLauncher;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::upgrade::{HandshakePolicy, ws_handler};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Starts connections for accepted upgrades.
    pub launcher: ConnectionLauncher,
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Upgrade gates.
    pub handshake: Arc<HandshakePolicy>,
    /// Max inbound message size.
    pub max_message_size: usize,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics_handle: PrometheusHandle,
    /// Root shutdown token, reported by `/health`.
    pub shutdown: CancellationToken,
}

/// The Roly WebSocket server.
pub struct RolyServer {
    config: ServerConfig,
    state: AppState,
    shutdown: Arc<ShutdownCoordinator>,
}

impl RolyServer {
    /// Create a server. Fails when the handshake policy cannot be built.
    pub fn new(
        config: ServerConfig,
        handler: Arc<dyn MessageHandler>,
        metrics_handle: PrometheusHandle,
    ) -> Result<Self, ServerError> {
        let handshake = Arc::new(HandshakePolicy::from_config(&config)?);
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let launcher = ConnectionLauncher::new(
            registry.clone(),
            handler,
            config.connection.clone(),
            shutdown.token(),
        );

        let state = AppState {
            launcher,
            registry,
            handshake,
            max_message_size: config.max_message_size,
            start_time: Instant::now(),
            metrics_handle,
            shutdown: shutdown.token(),
        };

        Ok(Self {
            config,
            state,
            shutdown,
        })
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address and the serve task. The task ends after
    /// [`ShutdownCoordinator::shutdown`] fires.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => return Err(ServerError::Bind { addr, source }),
        };
        let local_addr = listener.local_addr()?;

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
            info!("http listener stopped");
        });

        info!(addr = %local_addr, "server listening");
        Ok((local_addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the live-connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        &state.registry,
        state.shutdown.is_cancelled(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics_handle)
}

//! Turns an upgraded transport into a running connection.

use std::sync::Arc;

use metrics::{counter, gauge};
use roly_auth::Claims;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::connection::{Connection, ConnectionId, ConnectionParts};
use super::frame::{FrameSink, FrameStream};
use super::handler::MessageHandler;
use super::read_loop::{ReadExit, run_read_loop};
use super::registry::ConnectionRegistry;
use super::write_loop::{WriteExit, run_write_loop};
use crate::config::ConnectionConfig;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};

/// A connection whose loops have been spawned.
pub struct LaunchedConnection {
    /// The shared connection.
    pub connection: Arc<Connection>,
    /// Read loop task.
    pub reader: JoinHandle<ReadExit>,
    /// Write loop task.
    pub writer: JoinHandle<WriteExit>,
}

/// Everything needed to start connections, shared by all upgrades.
#[derive(Clone)]
pub struct ConnectionLauncher {
    registry: Arc<ConnectionRegistry>,
    handler: Arc<dyn MessageHandler>,
    config: ConnectionConfig,
    shutdown: CancellationToken,
}

impl ConnectionLauncher {
    /// `shutdown` is the parent of every connection's cancellation scope.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        handler: Arc<dyn MessageHandler>,
        config: ConnectionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            handler,
            config,
            shutdown,
        }
    }

    /// Register a connection over `sink`/`stream` and spawn both loops.
    ///
    /// Returns as soon as the tasks are spawned.
    pub fn launch(
        &self,
        sink: FrameSink,
        stream: FrameStream,
        origin: Option<String>,
        claims: Option<Claims>,
    ) -> LaunchedConnection {
        let (connection, rx) = Connection::new(
            ConnectionId::new(),
            ConnectionParts {
                sink,
                cancel: self.shutdown.child_token(),
                registry: self.registry.clone(),
                config: self.config.clone(),
                origin,
                claims,
            },
        );

        self.registry.insert(connection.clone());
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(
            conn_id = %connection.id(),
            origin = connection.origin().unwrap_or_default(),
            user_id = connection.claims().map(|c| c.user_id.as_str()),
            "websocket connection accepted"
        );

        let reader = tokio::spawn(run_read_loop(
            connection.clone(),
            stream,
            self.handler.clone(),
        ));
        let writer = tokio::spawn(run_write_loop(connection.clone(), rx));

        LaunchedConnection {
            connection,
            reader,
            writer,
        }
    }
}

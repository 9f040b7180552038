//! Per-message handler seam.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::connection::Connection;
use super::frame::Frame;

/// Handles one inbound text payload.
///
/// Each call runs as its own task, so calls for the same connection may
/// finish out of order. Replies go through [`Connection::enqueue`] or
/// [`Connection::try_enqueue`], which refuse once the connection is
/// cancelled.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Process `payload` received on `conn`.
    async fn handle(&self, conn: Arc<Connection>, payload: String);
}

/// Sends every payload back unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(&self, conn: Arc<Connection>, payload: String) {
        if conn.is_cancelled() {
            return;
        }
        if let Err(err) = conn.enqueue(Frame::Text(payload)).await {
            debug!(conn_id = %conn.id(), error = %err, "echo reply dropped");
        }
    }
}

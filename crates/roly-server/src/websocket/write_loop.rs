//! Write loop: drains the outbound queue onto the transport.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::connection::Connection;
use super::frame::{Frame, TransportError};

/// Why the write loop stopped.
#[derive(Debug)]
pub enum WriteExit {
    /// The connection's scope was cancelled.
    Cancelled,
    /// Every sender is gone and the queue is drained.
    QueueClosed,
    /// Cleanup already took the transport.
    SinkClosed,
    /// A send did not finish within the write deadline.
    Timeout,
    /// The transport rejected a send.
    Failed(TransportError),
}

/// Drive the write side until it stops, then run cleanup.
pub async fn run_write_loop(conn: Arc<Connection>, mut rx: mpsc::Receiver<Frame>) -> WriteExit {
    let exit = write_frames(&conn, &mut rx).await;
    if matches!(exit, WriteExit::Cancelled | WriteExit::QueueClosed) {
        debug!(conn_id = %conn.id(), exit = ?exit, "write loop stopped");
    }
    conn.cleanup().await;
    exit
}

async fn write_frames(conn: &Connection, rx: &mut mpsc::Receiver<Frame>) -> WriteExit {
    let debug_frames = conn.config().debug_frames;

    loop {
        let frame = tokio::select! {
            biased;
            () = conn.cancelled() => return WriteExit::Cancelled,
            next = rx.recv() => match next {
                Some(frame) => frame,
                None => return WriteExit::QueueClosed,
            },
        };

        let kind = frame.kind();
        let len = frame.len();
        let payload = match &frame {
            Frame::Text(text) if debug_frames => Some(text.clone()),
            _ => None,
        };
        if debug_frames {
            match &payload {
                Some(payload) => {
                    debug!(conn_id = %conn.id(), payload = %payload, "outbound frame");
                }
                None => debug!(conn_id = %conn.id(), kind, len, "outbound frame"),
            }
        }

        match conn.write_frame(frame).await {
            Ok(()) => {}
            Err(WriteExit::Cancelled) => return WriteExit::Cancelled,
            Err(exit) => {
                error!(
                    conn_id = %conn.id(),
                    kind,
                    len,
                    payload = payload.as_deref(),
                    exit = ?exit,
                    "websocket write failed"
                );
                return exit;
            }
        }
    }
}

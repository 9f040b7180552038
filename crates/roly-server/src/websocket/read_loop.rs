//! Read loop: pulls frames off the transport and dispatches text payloads.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, error, info};

use super::connection::Connection;
use super::frame::{CloseReason, Frame, FrameStream, TransportError};
use super::handler::MessageHandler;

/// Why the read loop stopped.
#[derive(Debug)]
pub enum ReadExit {
    /// The connection's scope was cancelled.
    Cancelled,
    /// Peer sent a close frame with an ordinary code (or none).
    PeerClosed(Option<CloseReason>),
    /// Peer sent a close frame with an unusual code.
    UnexpectedClose(CloseReason),
    /// The stream ended without a close frame.
    EndOfStream,
    /// Nothing arrived within the read deadline.
    IdleTimeout,
    /// The transport failed.
    Transport(TransportError),
}

impl ReadExit {
    /// Whether this is an ordinary end of a session, logged at info.
    pub fn is_expected(&self) -> bool {
        match self {
            Self::Cancelled | Self::PeerClosed(_) | Self::EndOfStream | Self::IdleTimeout => true,
            Self::UnexpectedClose(_) => false,
            Self::Transport(err) => err.is_expected_close(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Cancelled => "cancelled".into(),
            Self::PeerClosed(None) => "close frame".into(),
            Self::PeerClosed(Some(r)) | Self::UnexpectedClose(r) => {
                format!("close frame {} {}", r.code, r.reason)
            }
            Self::EndOfStream => "end of stream".into(),
            Self::IdleTimeout => "read deadline elapsed".into(),
            Self::Transport(err) => err.to_string(),
        }
    }
}

/// Drive the read side until it stops, then run cleanup.
pub async fn run_read_loop(
    conn: Arc<Connection>,
    mut stream: FrameStream,
    handler: Arc<dyn MessageHandler>,
) -> ReadExit {
    let exit = read_frames(&conn, &mut stream, &handler).await;

    match &exit {
        ReadExit::Cancelled => debug!(conn_id = %conn.id(), "read loop cancelled"),
        e if e.is_expected() => {
            info!(conn_id = %conn.id(), reason = %e.describe(), "websocket closed by peer");
        }
        e => error!(conn_id = %conn.id(), error = %e.describe(), "websocket read failed"),
    }

    conn.cleanup().await;
    exit
}

async fn read_frames(
    conn: &Arc<Connection>,
    stream: &mut FrameStream,
    handler: &Arc<dyn MessageHandler>,
) -> ReadExit {
    let read_deadline = conn.config().read_deadline;
    let debug_frames = conn.config().debug_frames;

    loop {
        if conn.is_cancelled() {
            return ReadExit::Cancelled;
        }

        let next = tokio::select! {
            biased;
            () = conn.cancelled() => return ReadExit::Cancelled,
            next = tokio::time::timeout(read_deadline, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => return ReadExit::IdleTimeout,
            Ok(None) => return ReadExit::EndOfStream,
            Ok(Some(Err(err))) => return ReadExit::Transport(err),
            Ok(Some(Ok(frame))) => frame,
        };
        conn.record_inbound();

        match frame {
            Frame::Text(payload) => {
                if debug_frames {
                    debug!(conn_id = %conn.id(), payload = %payload, "inbound frame");
                }
                let conn = conn.clone();
                let handler = handler.clone();
                let _ = tokio::spawn(async move { handler.handle(conn, payload).await });
            }
            Frame::Close(reason) => {
                return match reason {
                    Some(r) if !r.is_expected() => ReadExit::UnexpectedClose(r),
                    other => ReadExit::PeerClosed(other),
                };
            }
            other => {
                if debug_frames {
                    debug!(
                        conn_id = %conn.id(),
                        kind = other.kind(),
                        len = other.len(),
                        "inbound frame"
                    );
                }
            }
        }
    }
}

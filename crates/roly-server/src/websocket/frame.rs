//! Transport-neutral frames and the split transport halves.
//!
//! The loops never see `axum` types directly. A socket is split into a
//! [`FrameStream`] and a [`FrameSink`], which lets tests drive the loops
//! with an in-memory transport.

use std::error::Error as StdError;
use std::io;
use std::pin::Pin;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::error::ProtocolError;

/// Close codes the read loop cares about.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint going away (tab closed, server restart).
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error.
    pub const PROTOCOL: u16 = 1002;
    /// Abnormal closure (no close frame). Never sent on the wire.
    pub const ABNORMAL: u16 = 1006;
    /// Internal server error.
    pub const INTERNAL: u16 = 1011;
}

/// Code and reason carried by a close frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code.
    pub code: u16,
    /// Free-form reason text.
    pub reason: String,
}

impl CloseReason {
    /// Whether this code is an ordinary way for a peer to leave.
    pub fn is_expected(&self) -> bool {
        matches!(
            self.code,
            close_code::NORMAL | close_code::GOING_AWAY | close_code::ABNORMAL
        )
    }
}

/// A single WebSocket frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes.
    Binary(Bytes),
    /// Ping control frame.
    Ping(Bytes),
    /// Pong control frame.
    Pong(Bytes),
    /// Close control frame.
    Close(Option<CloseReason>),
}

impl Frame {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Close(_) => "close",
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) | Self::Ping(b) | Self::Pong(b) => b.len(),
            Self::Close(reason) => reason.as_ref().map_or(0, |r| r.reason.len() + 2),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Message> for Frame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Self::Text(text.as_str().to_owned()),
            Message::Binary(data) => Self::Binary(data),
            Message::Ping(data) => Self::Ping(data),
            Message::Pong(data) => Self::Pong(data),
            Message::Close(frame) => Self::Close(frame.map(|f| CloseReason {
                code: f.code,
                reason: f.reason.as_str().to_owned(),
            })),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Self::Text(text.into()),
            Frame::Binary(data) => Self::Binary(data),
            Frame::Ping(data) => Self::Ping(data),
            Frame::Pong(data) => Self::Pong(data),
            Frame::Close(reason) => Self::Close(reason.map(|r| CloseFrame {
                code: r.code,
                reason: r.reason.into(),
            })),
        }
    }
}

/// Transport-level failure. Always terminal for the connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Peer reset the TCP connection.
    #[error("connection reset by peer")]
    Reset,
    /// Connection aborted locally or by the network.
    #[error("connection aborted")]
    Aborted,
    /// Write to a half-closed socket.
    #[error("broken pipe")]
    BrokenPipe,
    /// Stream ended mid-frame.
    #[error("unexpected end of stream")]
    Eof,
    /// Peer dropped the socket without a close frame.
    #[error("connection reset without closing handshake")]
    ResetWithoutHandshake,
    /// Operation on a connection that already closed.
    #[error("connection already closed")]
    Closed,
    /// Any other I/O failure.
    #[error("i/o error: {0}")]
    Io(#[source] io::Error),
    /// WebSocket protocol violation or other library failure.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Whether this is an ordinary way for a peer to disappear.
    pub fn is_expected_close(&self) -> bool {
        !matches!(self, Self::Io(_) | Self::Protocol(_))
    }

    fn from_io_kind(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset => Self::Reset,
            io::ErrorKind::ConnectionAborted => Self::Aborted,
            io::ErrorKind::BrokenPipe => Self::BrokenPipe,
            io::ErrorKind::UnexpectedEof => Self::Eof,
            kind => Self::Io(io::Error::new(kind, err.to_string())),
        }
    }
}

impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        let mut source: Option<&(dyn StdError + 'static)> = Some(&err);
        while let Some(current) = source {
            if let Some(ws_err) = current.downcast_ref::<WsError>() {
                match ws_err {
                    WsError::ConnectionClosed | WsError::AlreadyClosed => return Self::Closed,
                    WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                        return Self::ResetWithoutHandshake;
                    }
                    _ => {}
                }
            }
            if let Some(io_err) = current.downcast_ref::<io::Error>() {
                return Self::from_io_kind(io_err);
            }
            source = current.source();
        }

        // Only reached when axum links a different tungstenite than ours.
        // Wording as of tungstenite 0.26.
        let text = err.to_string();
        if text.contains("without closing handshake") {
            Self::ResetWithoutHandshake
        } else if text.contains("closed normally") || text.contains("closed connection") {
            Self::Closed
        } else {
            Self::Protocol(text)
        }
    }
}

/// Read half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Write half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Split an upgraded socket into boxed frame halves.
pub fn split_socket(socket: WebSocket) -> (FrameSink, FrameStream) {
    let (sink, stream) = socket.split();
    let sink = sink
        .sink_map_err(TransportError::from)
        .with(|frame: Frame| futures::future::ready(Ok::<_, TransportError>(Message::from(frame))));
    let stream = stream.map(|item| item.map(Frame::from).map_err(TransportError::from));
    (Box::pin(sink), Box::pin(stream))
}

//! In-memory transport for driving connections in unit tests.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Sink;
use futures::channel::mpsc as fmpsc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::connection::{Connection, ConnectionId, ConnectionParts};
use super::frame::{Frame, FrameSink, FrameStream, TransportError};
use super::registry::ConnectionRegistry;
use crate::config::ConnectionConfig;

/// Short deadlines for tests (run under paused time where they matter).
pub(crate) fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        read_deadline: Duration::from_secs(1),
        write_deadline: Duration::from_millis(100),
        outbound_capacity: 10,
        debug_frames: true,
    }
}

#[derive(Default)]
struct SinkState {
    sent: Mutex<Vec<Frame>>,
    closes: AtomicUsize,
    stall: AtomicBool,
    fail: AtomicBool,
}

/// Test-side handle on a mock transport.
#[derive(Clone)]
pub(crate) struct MockTransport {
    inbound: Arc<Mutex<Option<fmpsc::UnboundedSender<Result<Frame, TransportError>>>>>,
    state: Arc<SinkState>,
}

impl MockTransport {
    /// Build a transport and its two frame halves.
    pub(crate) fn new() -> (Self, FrameSink, FrameStream) {
        let (tx, rx) = fmpsc::unbounded();
        let state = Arc::new(SinkState::default());
        let sink = MockSink {
            state: state.clone(),
            close_seen: false,
        };
        let transport = Self {
            inbound: Arc::new(Mutex::new(Some(tx))),
            state,
        };
        (transport, Box::pin(sink), Box::pin(rx))
    }

    /// Deliver a frame to the read side.
    pub(crate) fn push(&self, frame: Frame) {
        self.push_result(Ok(frame));
    }

    /// Deliver a transport error to the read side.
    pub(crate) fn push_error(&self, err: TransportError) {
        self.push_result(Err(err));
    }

    fn push_result(&self, item: Result<Frame, TransportError>) {
        if let Some(tx) = self.inbound.lock().as_ref() {
            let _ = tx.unbounded_send(item);
        }
    }

    /// End the read stream as if the socket vanished.
    pub(crate) fn hang_up(&self) {
        drop(self.inbound.lock().take());
    }

    /// Frames the write side has accepted.
    pub(crate) fn sent(&self) -> Vec<Frame> {
        self.state.sent.lock().clone()
    }

    /// Times the write side was closed.
    pub(crate) fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Make every write and close hang.
    pub(crate) fn stall_writes(&self, stall: bool) {
        self.state.stall.store(stall, Ordering::SeqCst);
    }

    /// Make every write fail with a broken pipe.
    pub(crate) fn fail_writes(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::SeqCst);
    }
}

struct MockSink {
    state: Arc<SinkState>,
    close_seen: bool,
}

impl MockSink {
    fn poll_writable(&self) -> Poll<Result<(), TransportError>> {
        if self.state.stall.load(Ordering::SeqCst) {
            Poll::Pending
        } else if self.state.fail.load(Ordering::SeqCst) {
            Poll::Ready(Err(TransportError::BrokenPipe))
        } else {
            Poll::Ready(Ok(()))
        }
    }
}

impl Sink<Frame> for MockSink {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.poll_writable()
    }

    fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        self.state.sent.lock().push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.poll_writable()
    }

    fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if !self.close_seen {
            self.close_seen = true;
            let _ = self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        if self.state.stall.load(Ordering::SeqCst) {
            Poll::Pending
        } else {
            Poll::Ready(Ok(()))
        }
    }
}

/// A connection wired to a mock transport.
pub(crate) struct MockConnection {
    pub(crate) conn: Arc<Connection>,
    pub(crate) rx: mpsc::Receiver<Frame>,
    pub(crate) stream: FrameStream,
    pub(crate) transport: MockTransport,
}

/// Build a connection over a mock transport. It is not registered.
pub(crate) fn mock_connection(
    registry: &Arc<ConnectionRegistry>,
    config: ConnectionConfig,
) -> MockConnection {
    mock_connection_with_cancel(registry, config, CancellationToken::new())
}

/// Like [`mock_connection`] with an explicit cancellation scope.
pub(crate) fn mock_connection_with_cancel(
    registry: &Arc<ConnectionRegistry>,
    config: ConnectionConfig,
    cancel: CancellationToken,
) -> MockConnection {
    let (transport, sink, stream) = MockTransport::new();
    let (conn, rx) = Connection::new(
        ConnectionId::new(),
        ConnectionParts {
            sink,
            cancel,
            registry: registry.clone(),
            config,
            origin: Some("https://roly.ai".into()),
            claims: None,
        },
    );
    MockConnection {
        conn,
        rx,
        stream,
        transport,
    }
}

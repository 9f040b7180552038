//! Per-connection state: identity, outbound queue, write half, and the
//! exactly-once cleanup.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::SinkExt;
use metrics::{counter, gauge};
use roly_auth::Claims;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::info;
use uuid::Uuid;

use super::frame::{Frame, FrameSink};
use super::registry::ConnectionRegistry;
use super::write_loop::WriteExit;
use crate::config::ConnectionConfig;
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_DISCONNECTIONS_TOTAL, WS_FRAMES_IN_TOTAL, WS_FRAMES_OUT_TOTAL,
};

/// Process-unique connection identity (UUID v7, never reused).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID.
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why an enqueue did not happen.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    /// The connection's scope was cancelled.
    #[error("connection cancelled")]
    Cancelled,
    /// Cleanup already closed the outbound queue.
    #[error("outbound queue closed")]
    Closed,
    /// Queue at capacity (non-blocking enqueue only). The frame is handed back.
    #[error("outbound queue full")]
    Full(Frame),
}

/// Everything a connection needs besides its id.
pub struct ConnectionParts {
    /// Write half of the transport.
    pub sink: FrameSink,
    /// Cancellation scope for this connection.
    pub cancel: CancellationToken,
    /// Registry the connection removes itself from on cleanup.
    pub registry: Arc<ConnectionRegistry>,
    /// Deadlines and queue capacity.
    pub config: ConnectionConfig,
    /// Origin presented at upgrade.
    pub origin: Option<String>,
    /// Claims from a validated bearer token.
    pub claims: Option<Claims>,
}

/// A live WebSocket connection.
///
/// Shared by its read loop, its write loop and any in-flight handler tasks.
/// Only the write loop sends through the transport; only [`cleanup`]
/// closes it.
///
/// [`cleanup`]: Connection::cleanup
pub struct Connection {
    id: ConnectionId,
    origin: Option<String>,
    claims: Option<Claims>,
    connected_at: Instant,
    config: ConnectionConfig,
    cancel: CancellationToken,
    tx: parking_lot::Mutex<Option<mpsc::Sender<Frame>>>,
    sink: tokio::sync::Mutex<Option<FrameSink>>,
    cleaned_up: AtomicBool,
    registry: Arc<ConnectionRegistry>,
    frames_in: AtomicU64,
    frames_out: AtomicU64,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("cancelled", &self.is_cancelled())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue.
    pub fn new(id: ConnectionId, parts: ConnectionParts) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(parts.config.outbound_capacity.max(1));
        let conn = Arc::new(Self {
            id,
            origin: parts.origin,
            claims: parts.claims,
            connected_at: Instant::now(),
            config: parts.config,
            cancel: parts.cancel,
            tx: parking_lot::Mutex::new(Some(tx)),
            sink: tokio::sync::Mutex::new(Some(parts.sink)),
            cleaned_up: AtomicBool::new(false),
            registry: parts.registry,
            frames_in: AtomicU64::new(0),
            frames_out: AtomicU64::new(0),
        });
        (conn, rx)
    }

    /// Connection id.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Origin presented at upgrade.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Claims from the handshake token, when bearer auth is on.
    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    /// Lifecycle tuning.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Time since accept.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Whether the cancellation scope has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the cancellation scope fires.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Fire the cancellation scope. Both loops exit and run cleanup.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cleanup has started.
    pub fn is_closed(&self) -> bool {
        self.cleaned_up.load(Ordering::Acquire)
    }

    /// Frames read from the peer.
    pub fn frames_in(&self) -> u64 {
        self.frames_in.load(Ordering::Relaxed)
    }

    /// Frames written to the peer.
    pub fn frames_out(&self) -> u64 {
        self.frames_out.load(Ordering::Relaxed)
    }

    pub(crate) fn record_inbound(&self) {
        let _ = self.frames_in.fetch_add(1, Ordering::Relaxed);
        counter!(WS_FRAMES_IN_TOTAL).increment(1);
    }

    /// Queue a frame for the write loop, waiting while the queue is full.
    ///
    /// The wait races the cancellation scope, so it never outlives teardown.
    pub async fn enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        if self.is_cancelled() {
            return Err(EnqueueError::Cancelled);
        }
        let tx = self.tx.lock().clone().ok_or(EnqueueError::Closed)?;

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(EnqueueError::Cancelled),
            sent = tx.send(frame) => sent.map_err(|_| EnqueueError::Closed),
        }
    }

    /// Queue a frame without waiting. A full queue returns the frame.
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        if self.is_cancelled() {
            return Err(EnqueueError::Cancelled);
        }
        let slot = self.tx.lock();
        let tx = slot.as_ref().ok_or(EnqueueError::Closed)?;
        tx.try_send(frame).map_err(|err| match err {
            TrySendError::Full(frame) => EnqueueError::Full(frame),
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Send one frame under the write deadline, racing cancellation.
    pub(crate) async fn write_frame(&self, frame: Frame) -> Result<(), WriteExit> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(WriteExit::Cancelled),
            result = self.send_with_deadline(frame) => result,
        }
    }

    async fn send_with_deadline(&self, frame: Frame) -> Result<(), WriteExit> {
        let mut slot = self.sink.lock().await;
        let Some(sink) = slot.as_mut() else {
            return Err(WriteExit::SinkClosed);
        };
        match tokio::time::timeout(self.config.write_deadline, sink.send(frame)).await {
            Ok(Ok(())) => {
                let _ = self.frames_out.fetch_add(1, Ordering::Relaxed);
                counter!(WS_FRAMES_OUT_TOTAL).increment(1);
                Ok(())
            }
            Ok(Err(err)) => Err(WriteExit::Failed(err)),
            Err(_) => Err(WriteExit::Timeout),
        }
    }

    /// Tear the connection down. Only the first call does anything.
    ///
    /// Cancels the scope, closes the transport (bounded by the write
    /// deadline, errors ignored), closes the outbound queue, then deregisters.
    pub async fn cleanup(&self) {
        if self
            .cleaned_up
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.cancel.cancel();

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            let _ = tokio::time::timeout(self.config.write_deadline, sink.close()).await;
        }

        drop(self.tx.lock().take());

        let _ = self.registry.remove(&self.id);
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);

        info!(
            conn_id = %self.id,
            lifetime_ms = u64::try_from(self.age().as_millis()).unwrap_or(u64::MAX),
            frames_in = self.frames_in(),
            frames_out = self.frames_out(),
            "websocket connection closed"
        );
    }
}

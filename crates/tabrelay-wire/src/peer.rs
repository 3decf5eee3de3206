//! PeerManager: the single duplex connection to the browser extension.
//!
//! The extension dials in and becomes *the* active peer. A later connection
//! supersedes the current one (the extension reconnecting), and the old one
//! is closed. Each accepted connection runs a read loop that hands replies
//! to the [`CorrelationRegistry`] by id.
//!
//! Transports plug in through [`PeerSink`] and [`PeerStream`]; the HTTP layer
//! adapts an axum WebSocket, tests use in-memory channels.

use crate::message::{decode_reply, encode_task, PeerTask};
use crate::registry::CorrelationRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Errors from the wire layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No peer connected")]
    NoPeerConnected,
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Write half of a peer connection.
#[async_trait]
pub trait PeerSink: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), WireError>;

    /// Close the connection. Best effort.
    async fn close(&mut self) -> Result<(), WireError> {
        Ok(())
    }
}

/// Read half of a peer connection.
#[async_trait]
pub trait PeerStream: Send {
    /// Wait for the next text frame. `None` once the stream is closed.
    async fn recv_text(&mut self) -> Option<Result<String, WireError>>;
}

/// Identity of an accepted connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    /// Increases with every accepted connection.
    pub generation: u64,
    /// Human-readable origin, e.g. the remote socket address.
    pub label: String,
    pub connected_at: DateTime<Utc>,
}

type SharedSink = Arc<Mutex<Box<dyn PeerSink>>>;

struct ActivePeer {
    info: PeerInfo,
    sink: SharedSink,
}

/// Owns the active peer connection.
pub struct PeerManager {
    registry: Arc<CorrelationRegistry>,
    active: RwLock<Option<ActivePeer>>,
    next_generation: AtomicU64,
}

impl PeerManager {
    /// Create a manager with no peer connected.
    pub fn new(registry: Arc<CorrelationRegistry>) -> Self {
        Self {
            registry,
            active: RwLock::new(None),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Make a newly arrived connection the active peer and start its read loop.
    ///
    /// Any previously active peer is superseded and closed. Pending requests
    /// are left alone: replies are matched by id, whichever connection
    /// carries them. Must be called from within a tokio runtime.
    pub fn accept<S, R>(self: &Arc<Self>, label: impl Into<String>, sink: S, stream: R) -> JoinHandle<()>
    where
        S: PeerSink + 'static,
        R: PeerStream + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let info = PeerInfo {
            generation,
            label: label.into(),
            connected_at: Utc::now(),
        };
        let sink: SharedSink = Arc::new(Mutex::new(Box::new(sink)));

        let previous = {
            let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
            active.replace(ActivePeer {
                info: info.clone(),
                sink,
            })
        };
        if let Some(old) = previous {
            info!(
                old_generation = old.info.generation,
                generation, "Peer superseded by new connection"
            );
            tokio::spawn(close_sink(old.sink, old.info.generation));
        }
        info!(peer = %info.label, generation, "Peer connected");

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.read_loop(generation, stream).await;
            manager.release(generation);
        })
    }

    /// Write a task to the active peer. Does not wait for a reply.
    pub async fn send(&self, task: &PeerTask) -> Result<(), WireError> {
        let (generation, sink) = {
            let active = self.active.read().unwrap_or_else(|e| e.into_inner());
            match active.as_ref() {
                Some(peer) => (peer.info.generation, Arc::clone(&peer.sink)),
                None => return Err(WireError::NoPeerConnected),
            }
        };

        let frame = encode_task(task)?;
        let mut sink = sink.lock().await;
        if let Err(e) = sink.send_text(frame).await {
            warn!(id = %task.id, generation, error = %e, "Failed to send task to peer");
            return Err(e);
        }
        debug!(id = %task.id, generation, "Sent task to peer");
        Ok(())
    }

    /// Whether a peer is currently active.
    pub fn is_connected(&self) -> bool {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Snapshot of the active peer, if any.
    pub fn active_peer(&self) -> Option<PeerInfo> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.info.clone())
    }

    /// Drop and close the active peer, if any.
    pub async fn disconnect(&self) -> Option<PeerInfo> {
        let taken = self
            .active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let peer = taken?;
        info!(peer = %peer.info.label, generation = peer.info.generation, "Disconnecting peer");
        close_sink(peer.sink, peer.info.generation).await;
        Some(peer.info)
    }

    /// Read frames until the stream ends. Never resolves entries on exit.
    async fn read_loop<R: PeerStream>(&self, generation: u64, mut stream: R) {
        loop {
            match stream.recv_text().await {
                Some(Ok(text)) => self.dispatch(generation, &text),
                Some(Err(e)) => {
                    warn!(generation, error = %e, "Peer read failed");
                    return;
                }
                None => {
                    debug!(generation, "Peer stream closed");
                    return;
                }
            }
        }
    }

    fn dispatch(&self, generation: u64, text: &str) {
        let reply = match decode_reply(text) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(generation, error = %e, "Dropping malformed peer message");
                return;
            }
        };
        match reply.id {
            Some(id) => {
                if self.registry.resolve(&id, reply.content) {
                    debug!(id = %id, generation, "Reply delivered");
                }
            }
            None => debug!(generation, "Dropping peer message without id"),
        }
    }

    /// Clear the active slot if it still belongs to `generation`.
    fn release(&self, generation: u64) -> bool {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        match active.as_ref() {
            Some(peer) if peer.info.generation == generation => {
                info!(peer = %peer.info.label, generation, "Peer disconnected");
                *active = None;
                true
            }
            _ => {
                debug!(generation, "Superseded peer loop ended");
                false
            }
        }
    }
}

/// Upper bound on closing a connection. A write stalled on a peer that stopped
/// reading holds the sink lock until its caller's deadline.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

async fn close_sink(sink: SharedSink, generation: u64) {
    let close = async { sink.lock().await.close().await };
    match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(generation, error = %e, "Error closing peer connection"),
        Err(_) => warn!(generation, "Gave up closing peer connection: writer is stalled"),
    }
}

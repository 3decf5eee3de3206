//! RequestBridge: a request/response call over the asynchronous peer.
//!
//! Each [`forward`](RequestBridge::forward) registers a correlation entry,
//! sends `{id, prompt}` to the peer and suspends until the reply for that id
//! arrives, the timeout elapses, or the caller cancels. The entry is removed
//! exactly once on every path, including when the future itself is dropped.

use crate::message::PeerTask;
use crate::peer::{PeerManager, WireError};
use crate::registry::CorrelationRegistry;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tabrelay_types::error::BridgeError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

/// Removes the entry when the forward call ends, however it ends.
struct PendingGuard<'a> {
    registry: &'a CorrelationRegistry,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// A reply matched to its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Correlation id the task was sent under.
    pub id: String,
    /// Text the peer answered with.
    pub content: String,
}

/// Public entry point for forwarding tasks to the peer.
#[derive(Clone)]
pub struct RequestBridge {
    registry: Arc<CorrelationRegistry>,
    peers: Arc<PeerManager>,
}

impl RequestBridge {
    pub fn new(registry: Arc<CorrelationRegistry>, peers: Arc<PeerManager>) -> Self {
        Self { registry, peers }
    }

    /// Forward `content` to the peer and wait up to `timeout` for its reply.
    pub async fn forward(&self, content: &str, timeout: Duration) -> Result<String, BridgeError> {
        self.forward_with_cancel(content, timeout, std::future::pending())
            .await
            .map(|completion| completion.content)
    }

    /// Like [`forward`](Self::forward), but gives up with
    /// [`BridgeError::Cancelled`] as soon as `cancel` completes, and returns
    /// the correlation id alongside the reply.
    ///
    /// `timeout` bounds the whole exchange, the outbound write included: a
    /// peer that stops reading cannot hold the caller past its deadline.
    /// The peer is not told about cancellation; a late reply is discarded.
    pub async fn forward_with_cancel<C>(
        &self,
        content: &str,
        timeout: Duration,
        cancel: C,
    ) -> Result<Completion, BridgeError>
    where
        C: Future<Output = ()>,
    {
        if !self.peers.is_connected() {
            return Err(BridgeError::PeerUnavailable);
        }

        let started = Instant::now();
        // A configured timeout too large for the clock means "effectively never".
        let deadline = started
            .checked_add(timeout)
            .unwrap_or_else(|| started + Duration::from_secs(FAR_FUTURE_SECS));
        let (id, waiter) = self.registry.register();
        let _guard = PendingGuard {
            registry: &self.registry,
            id: &id,
        };

        let task = PeerTask {
            id: id.clone(),
            prompt: content.to_string(),
        };
        debug!(id = %id, prompt_len = content.len(), "Forwarding task to peer");

        let exchange = async {
            self.peers.send(&task).await.map_err(|e| match e {
                WireError::NoPeerConnected => BridgeError::PeerUnavailable,
                other => BridgeError::SendFailed(other.to_string()),
            })?;
            // Sender dropped without a value: the registry was cleared on shutdown.
            waiter.await.map_err(|_| BridgeError::Cancelled)
        };

        let result = tokio::select! {
            reply = exchange => reply,
            _ = tokio::time::sleep_until(deadline) => Err(BridgeError::Timeout(timeout)),
            _ = cancel => Err(BridgeError::Cancelled),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(id = %id, elapsed_ms, "Peer replied"),
            Err(BridgeError::Timeout(_)) => {
                warn!(id = %id, elapsed_ms, "Peer did not reply in time")
            }
            Err(BridgeError::Cancelled) => info!(id = %id, elapsed_ms, "Request cancelled"),
            Err(e) => warn!(id = %id, error = %e, "Forward failed"),
        }
        result.map(|content| Completion {
            id: id.clone(),
            content,
        })
    }
}

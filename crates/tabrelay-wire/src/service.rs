//! RelayService: the process-wide relay with an explicit lifecycle.
//!
//! Owns the registry, the peer manager and the bridge. Created once at
//! startup and shared by `Arc` with the HTTP layer.

use crate::bridge::RequestBridge;
use crate::peer::{PeerManager, PeerSink, PeerStream};
use crate::registry::CorrelationRegistry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct RelayService {
    registry: Arc<CorrelationRegistry>,
    peers: Arc<PeerManager>,
    bridge: RequestBridge,
    running: AtomicBool,
    /// Held across `accept` and `stop` so no peer is adopted after shutdown.
    lifecycle: Mutex<()>,
}

impl RelayService {
    /// Build a stopped service.
    pub fn new() -> Arc<Self> {
        let registry = Arc::new(CorrelationRegistry::new());
        let peers = Arc::new(PeerManager::new(Arc::clone(&registry)));
        let bridge = RequestBridge::new(Arc::clone(&registry), Arc::clone(&peers));
        Arc::new(Self {
            registry,
            peers,
            bridge,
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        })
    }

    /// Start accepting peers.
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("Relay started");
        }
    }

    /// Stop accepting peers, close the active one and release every waiter.
    ///
    /// Callers still waiting observe [`BridgeError::Cancelled`](tabrelay_types::error::BridgeError::Cancelled).
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.peers.disconnect().await;
        let abandoned = self.registry.clear();
        info!(abandoned, "Relay stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Hand a new connection to the peer manager.
    ///
    /// Returns the read-loop handle, or `None` (after closing the sink) when
    /// the service is stopped.
    pub async fn accept<S, R>(
        &self,
        label: impl Into<String>,
        mut sink: S,
        stream: R,
    ) -> Option<JoinHandle<()>>
    where
        S: PeerSink + 'static,
        R: PeerStream + 'static,
    {
        let label = label.into();
        {
            let _lifecycle = self.lifecycle.lock().await;
            if self.is_running() {
                return Some(self.peers.accept(label, sink, stream));
            }
        }
        warn!(peer = %label, "Rejecting peer: relay is stopped");
        let _ = sink.close().await;
        None
    }

    pub fn bridge(&self) -> &RequestBridge {
        &self.bridge
    }

    pub fn peers(&self) -> &Arc<PeerManager> {
        &self.peers
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }
}

//! Shared application state and the health endpoint.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tabrelay_types::config::RelayConfig;
use tabrelay_wire::RelayService;
use tokio::sync::watch;

/// State shared by every handler.
pub struct AppState {
    pub relay: Arc<RelayService>,
    pub config: RelayConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl AppState {
    pub fn new(relay: Arc<RelayService>, config: RelayConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            relay,
            config,
            shutdown_tx,
        }
    }

    /// Signal in-flight requests that the server is going away.
    pub fn begin_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Completes once [`begin_shutdown`](Self::begin_shutdown) has been called.
    pub fn shutdown_signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown_tx.subscribe();
        async move {
            if rx.wait_for(|stopping| *stopping).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let peer = state.relay.peers().active_peer();
    let status = if state.relay.is_running() { "ok" } else { "stopped" };
    Json(serde_json::json!({
        "status": status,
        "peer_connected": peer.is_some(),
        "peer": peer,
        "pending": state.relay.registry().len(),
        "stats": state.relay.registry().stats(),
    }))
}

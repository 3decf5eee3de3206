//! Peer WebSocket endpoint.
//!
//! Adapts an upgraded axum [`WebSocket`] to the wire layer's
//! [`PeerSink`]/[`PeerStream`] and hands it to the relay as the new peer.

use crate::routes::AppState;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tabrelay_wire::{PeerSink, PeerStream, WireError};
use tracing::{debug, warn};

/// Write half of the peer socket.
pub struct WsSink(SplitSink<WebSocket, Message>);

/// Read half of the peer socket.
pub struct WsStream(SplitStream<WebSocket>);

#[async_trait]
impl PeerSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), WireError> {
        self.0
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| WireError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), WireError> {
        let _ = self.0.send(Message::Close(None)).await;
        self.0
            .close()
            .await
            .map_err(|e| WireError::Transport(e.to_string()))
    }
}

#[async_trait]
impl PeerStream for WsStream {
    async fn recv_text(&mut self) -> Option<Result<String, WireError>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => warn!("Dropping non-UTF-8 binary frame from peer"),
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Peer sent close frame");
                    return None;
                }
                // Ping/pong are answered by axum.
                Ok(_) => {}
                Err(e) => return Some(Err(WireError::Transport(e.to_string()))),
            }
        }
    }
}

/// GET /ws: the browser extension connects here.
pub async fn peer_socket(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_peer_socket(socket, addr, state))
}

async fn handle_peer_socket(socket: WebSocket, addr: SocketAddr, state: Arc<AppState>) {
    let (sink, stream) = socket.split();
    let Some(read_loop) = state
        .relay
        .accept(addr.to_string(), WsSink(sink), WsStream(stream))
        .await
    else {
        return;
    };
    if let Err(e) = read_loop.await {
        warn!(peer = %addr, error = %e, "Peer read loop aborted");
    }
}

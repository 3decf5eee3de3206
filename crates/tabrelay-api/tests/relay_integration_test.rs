//! End-to-end tests for the relay.
//!
//! Each test boots the real router on `127.0.0.1:0`, connects a WebSocket
//! client that plays the browser extension, and drives the OpenAI endpoint
//! over HTTP. Nothing outside the process is contacted.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabrelay_api::routes::AppState;
use tabrelay_api::server::serve;
use tabrelay_types::config::RelayConfig;
use tabrelay_wire::RelayService;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type PeerSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct TestRelay {
    addr: SocketAddr,
    state: Arc<AppState>,
    _shutdown: oneshot::Sender<()>,
}

impl TestRelay {
    async fn start(timeout_secs: u64) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = RelayConfig {
            request_timeout_secs: timeout_secs,
            ..RelayConfig::default()
        };
        let state = Arc::new(AppState::new(RelayService::new(), config));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(serve(listener, Arc::clone(&state), async move {
            let _ = shutdown_rx.await;
        }));
        Self {
            addr,
            state,
            _shutdown: shutdown_tx,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Connect a peer and wait until the relay has adopted it.
    async fn connect_peer(&self) -> PeerSocket {
        let before = self
            .state
            .relay
            .peers()
            .active_peer()
            .map(|p| p.generation)
            .unwrap_or(0);
        let (socket, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("peer connects");
        self.wait_until(|| {
            self.state
                .relay
                .peers()
                .active_peer()
                .is_some_and(|p| p.generation > before)
        })
        .await;
        socket
    }

    async fn wait_until(&self, cond: impl Fn() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within 2s");
    }

    async fn chat(&self, prompt: &str) -> reqwest::Response {
        reqwest::Client::new()
            .post(self.url("/v1/chat/completions"))
            .json(&serde_json::json!({
                "model": "openai/gemini-web",
                "messages": [
                    {"role": "system", "content": "You are a coding assistant."},
                    {"role": "user", "content": prompt}
                ]
            }))
            .send()
            .await
            .unwrap()
    }
}

/// Read the next `{id, prompt}` task from the relay.
async fn next_task(socket: &mut PeerSocket) -> (String, String) {
    loop {
        match socket.next().await.expect("socket open").expect("frame") {
            Message::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                return (
                    value["id"].as_str().unwrap().to_string(),
                    value["prompt"].as_str().unwrap().to_string(),
                );
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn reply(socket: &mut PeerSocket, id: &str, content: &str) {
    let frame = serde_json::json!({"id": id, "content": content}).to_string();
    socket.send(Message::Text(frame)).await.unwrap();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_hello_world_round_trip() {
    let relay = TestRelay::start(5).await;
    let mut peer = relay.connect_peer().await;

    let peer_task = tokio::spawn(async move {
        let (id, prompt) = next_task(&mut peer).await;
        assert_eq!(prompt, "hello");
        reply(&mut peer, &id, "world").await;
        (peer, id)
    });

    let started = Instant::now();
    let response = relay.chat("hello").await;
    assert_eq!(response.status(), 200);
    assert!(started.elapsed() < Duration::from_secs(5));

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "gemini-web-bridge");
    assert_eq!(body["choices"][0]["message"]["content"], "world");
    assert!(relay.state.relay.registry().is_empty());

    // The completion id names the task the peer answered.
    let (_peer, task_id) = peer_task.await.unwrap();
    assert_eq!(body["id"], format!("chatcmpl-{task_id}"));
}

#[tokio::test]
async fn test_no_peer_returns_503_immediately() {
    let relay = TestRelay::start(5).await;

    let started = Instant::now();
    let response = relay.chat("hello").await;
    assert_eq!(response.status(), 503);
    assert!(started.elapsed() < Duration::from_secs(1));

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "peer_unavailable");
    assert_eq!(relay.state.relay.registry().stats().registered, 0);
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let relay = TestRelay::start(1).await;
    let mut peer = relay.connect_peer().await;

    let started = Instant::now();
    let (response, _task) = tokio::join!(relay.chat("hello"), next_task(&mut peer));
    let elapsed = started.elapsed();

    assert_eq!(response.status(), 504);
    assert!(elapsed >= Duration::from_millis(900), "timed out too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "timed out too late: {elapsed:?}");
    assert!(relay.state.relay.registry().is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_answered_in_reverse() {
    const N: usize = 5;
    let relay = Arc::new(TestRelay::start(10).await);
    let mut peer = relay.connect_peer().await;

    let calls: Vec<_> = (0..N)
        .map(|i| {
            let relay = Arc::clone(&relay);
            tokio::spawn(async move {
                let prompt = format!("question {i}");
                let body: serde_json::Value = relay.chat(&prompt).await.json().await.unwrap();
                (prompt, body)
            })
        })
        .collect();

    let mut tasks = Vec::new();
    for _ in 0..N {
        tasks.push(next_task(&mut peer).await);
    }
    for (id, prompt) in tasks.iter().rev() {
        reply(&mut peer, id, &format!("answer to {prompt}")).await;
    }

    for call in calls {
        let (prompt, body) = call.await.unwrap();
        assert_eq!(
            body["choices"][0]["message"]["content"],
            format!("answer to {prompt}")
        );
    }
    assert!(relay.state.relay.registry().is_empty());
}

#[tokio::test]
async fn test_malformed_and_stale_frames_are_ignored() {
    let relay = TestRelay::start(5).await;
    let mut peer = relay.connect_peer().await;

    peer.send(Message::Text("definitely not json".to_string()))
        .await
        .unwrap();
    reply(&mut peer, "no-such-request", "stale").await;

    let peer_task = tokio::spawn(async move {
        let (id, _) = next_task(&mut peer).await;
        reply(&mut peer, &id, "fine").await;
        peer
    });
    let body: serde_json::Value = relay.chat("still alive?").await.json().await.unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "fine");
    assert_eq!(relay.state.relay.registry().stats().stale_replies, 1);
    peer_task.await.unwrap();
}

#[tokio::test]
async fn test_reconnect_answers_pending_request() {
    let relay = Arc::new(TestRelay::start(10).await);
    let mut first = relay.connect_peer().await;

    let call = tokio::spawn({
        let relay = Arc::clone(&relay);
        async move { relay.chat("survive a reconnect").await }
    });
    let (id, _) = next_task(&mut first).await;

    // The extension drops and comes back; the request is still pending.
    first.close(None).await.unwrap();
    drop(first);
    relay
        .wait_until(|| !relay.state.relay.peers().is_connected())
        .await;
    assert_eq!(relay.state.relay.registry().len(), 1);

    let mut second = relay.connect_peer().await;
    reply(&mut second, &id, "answered by the new peer").await;

    let response = call.await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "answered by the new peer"
    );
}

#[tokio::test]
async fn test_health_reports_peer() {
    let relay = TestRelay::start(5).await;
    let _peer = relay.connect_peer().await;

    let body: serde_json::Value = reqwest::get(relay.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["peer_connected"], true);
    assert_eq!(body["peer"]["generation"], 1);
}

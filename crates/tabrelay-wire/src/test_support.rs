//! In-memory peer transport for unit tests.

use crate::message::PeerTask;
use crate::peer::{PeerSink, PeerStream, WireError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Relay-side write half.
pub(crate) struct MemorySink {
    tx: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

/// Relay-side read half.
pub(crate) struct MemoryStream {
    rx: mpsc::UnboundedReceiver<String>,
}

/// The far end, driven by the test as if it were the browser extension.
pub(crate) struct RemotePeer {
    tasks: mpsc::UnboundedReceiver<String>,
    replies: Option<mpsc::UnboundedSender<String>>,
    closed: Arc<AtomicBool>,
}

pub(crate) fn memory_pair() -> (MemorySink, MemoryStream, RemotePeer) {
    let (task_tx, task_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        MemorySink {
            tx: task_tx,
            closed: Arc::clone(&closed),
        },
        MemoryStream { rx: reply_rx },
        RemotePeer {
            tasks: task_rx,
            replies: Some(reply_tx),
            closed,
        },
    )
}

#[async_trait]
impl PeerSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), WireError> {
        self.tx.send(text).map_err(|_| WireError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), WireError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Write half whose sends never complete, like a socket the peer stopped reading.
pub(crate) struct StalledSink {
    closed: Arc<AtomicBool>,
}

/// Like [`memory_pair`], but every task write hangs forever.
pub(crate) fn stalled_pair() -> (StalledSink, MemoryStream, RemotePeer) {
    let (sink, stream, remote) = memory_pair();
    let stalled = StalledSink {
        closed: Arc::clone(&sink.closed),
    };
    (stalled, stream, remote)
}

#[async_trait]
impl PeerSink for StalledSink {
    async fn send_text(&mut self, _text: String) -> Result<(), WireError> {
        std::future::pending().await
    }

    async fn close(&mut self) -> Result<(), WireError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PeerStream for MemoryStream {
    async fn recv_text(&mut self) -> Option<Result<String, WireError>> {
        self.rx.recv().await.map(Ok)
    }
}

impl RemotePeer {
    /// Wait for the next task the relay sends.
    pub(crate) async fn next_task(&mut self) -> PeerTask {
        let text = self.tasks.recv().await.expect("relay closed the task channel");
        serde_json::from_str(&text).expect("task is valid JSON")
    }

    /// Reply to a task the way the extension does.
    pub(crate) fn reply(&self, id: &str, content: &str) {
        let frame = serde_json::json!({ "id": id, "content": content }).to_string();
        self.send_raw(&frame);
    }

    pub(crate) fn send_raw(&self, text: &str) {
        if let Some(tx) = &self.replies {
            let _ = tx.send(text.to_string());
        }
    }

    /// Stop accepting tasks; further relay writes fail.
    pub(crate) fn refuse_tasks(&mut self) {
        self.tasks.close();
    }

    /// Close the inbound direction, ending the relay's read loop.
    pub(crate) fn hang_up(&mut self) {
        self.replies = None;
    }

    /// Whether the relay closed its write half.
    pub(crate) fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Poll `cond` until it holds, failing the test after one second.
pub(crate) async fn eventually(cond: impl Fn() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 1s");
}

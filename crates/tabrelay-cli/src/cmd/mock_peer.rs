//! `tabrelay mock-peer`: stand in for the browser extension.
//!
//! Connects to the relay's peer socket and answers every task with the
//! prompt echoed back, optionally after a delay. Tasks are answered
//! concurrently, so replies may overtake each other like real ones do.

use crate::cmd::runtime;
use crate::ui;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tabrelay_wire::{PeerReply, PeerTask};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

/// Build the reply frame for one task.
fn echo_reply(task: PeerTask, prefix: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(&PeerReply {
        id: Some(task.id),
        content: format!("{prefix}{}", task.prompt),
    })
}

pub fn cmd_mock_peer(url: &str, prefix: &str, delay_ms: u64) {
    let rt = runtime();
    if let Err(e) = rt.block_on(run(url, prefix, Duration::from_millis(delay_ms))) {
        ui::error_with_fix(
            &format!("Mock peer stopped: {e}"),
            "Check that the relay is running and the URL points at its peer socket",
        );
        std::process::exit(1);
    }
}

async fn run(
    url: &str,
    prefix: &str,
    delay: Duration,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let (socket, _) = connect_async(url).await?;
    ui::success(&format!("Connected to {url} as peer"));
    let (mut write, mut read) = socket.split();

    // Replies are produced by per-task timers and funnelled through one writer.
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

    loop {
        tokio::select! {
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e),
                };
                let task: PeerTask = match serde_json::from_str(&text) {
                    Ok(task) => task,
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed task");
                        continue;
                    }
                };
                info!(id = %task.id, prompt_len = task.prompt.len(), "Task received");
                let reply_tx = reply_tx.clone();
                let prefix = prefix.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    match echo_reply(task, &prefix) {
                        Ok(frame) => {
                            let _ = reply_tx.send(frame);
                        }
                        Err(e) => warn!(error = %e, "Failed to encode reply"),
                    }
                });
            }
            Some(frame) = reply_rx.recv() => {
                write.send(Message::Text(frame)).await?;
            }
        }
    }

    ui::success("Relay closed the connection");
    Ok(())
}

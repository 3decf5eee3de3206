//! Wire protocol message types.
//!
//! One JSON object per text frame. The relay sends `{"id", "prompt"}` and the
//! peer answers with `{"id", "content"}` carrying the same id.

use serde::{Deserialize, Serialize};

/// Outbound task for the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTask {
    /// Correlation id the reply must echo back.
    pub id: String,
    /// Prompt text for the peer to execute.
    pub prompt: String,
}

/// Inbound reply from the peer.
///
/// `id` is optional on the wire: frames without one cannot be attributed to
/// any request and are dropped by the read loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerReply {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// Serialize a task into a single text frame.
pub fn encode_task(task: &PeerTask) -> Result<String, serde_json::Error> {
    serde_json::to_string(task)
}

/// Parse a text frame from the peer.
pub fn decode_reply(text: &str) -> Result<PeerReply, serde_json::Error> {
    serde_json::from_str(text)
}

//! OpenAI-compatible `/v1/chat/completions` API endpoint.
//!
//! Lets any OpenAI client (Aider, SDKs, curl) talk to the browser peer. The
//! text of the last message becomes the prompt; the peer's reply comes back
//! as a single non-streaming `chat.completion`.

use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tabrelay_types::error::BridgeError;
use tabrelay_wire::Completion;
use tracing::{debug, info};

// ── Request types ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<OaiMessage>,
    #[serde(default)]
    pub stream: bool,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct OaiMessage {
    pub role: String,
    #[serde(default)]
    pub content: OaiContent,
}

#[derive(Debug, Deserialize, Default)]
#[serde(untagged)]
pub enum OaiContent {
    Text(String),
    Parts(Vec<OaiContentPart>),
    #[default]
    Null,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum OaiContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: OaiImageUrlRef },
}

#[derive(Debug, Deserialize)]
pub struct OaiImageUrlRef {
    pub url: String,
}

// ── Response types ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatCompletionResponse {
    id: String,
    object: &'static str,
    created: u64,
    model: String,
    choices: Vec<Choice>,
    usage: UsageInfo,
}

#[derive(Serialize)]
struct Choice {
    index: u32,
    message: ChoiceMessage,
    finish_reason: &'static str,
}

#[derive(Serialize)]
struct ChoiceMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize, Default)]
struct UsageInfo {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[derive(Serialize)]
struct ModelObject {
    id: String,
    object: &'static str,
    created: u64,
    owned_by: &'static str,
}

#[derive(Serialize)]
struct ModelListResponse {
    object: &'static str,
    data: Vec<ModelObject>,
}

// ── Prompt extraction ───────────────────────────────────────────────────────

/// Text of the last message, which is where clients like Aider pack the
/// whole context. Image parts are ignored; the peer only takes text.
fn extract_prompt(messages: &[OaiMessage]) -> Option<String> {
    let text = match &messages.last()?.content {
        OaiContent::Text(text) => text.clone(),
        OaiContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                OaiContentPart::Text { text } => Some(text.as_str()),
                OaiContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        OaiContent::Null => return None,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn error_response(status: StatusCode, message: String, kind: &str, code: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": {
                "message": message,
                "type": kind,
                "code": code
            }
        })),
    )
        .into_response()
}

/// Map a forward failure onto an HTTP status.
fn bridge_error_status(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::PeerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::SendFailed(_) => StatusCode::BAD_GATEWAY,
        BridgeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        // Client closed request (nginx convention).
        BridgeError::Cancelled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatCompletionRequest>,
) -> Response {
    let Some(prompt) = extract_prompt(&req.messages) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "No messages provided".to_string(),
            "invalid_request_error",
            "missing_message",
        );
    };
    if req.stream {
        debug!("Streaming requested; answering with a single completion");
    }
    debug!(
        requested_model = req.model.as_deref().unwrap_or("-"),
        max_tokens = ?req.max_tokens,
        temperature = ?req.temperature,
        "Chat completion request"
    );

    let timeout = state.config.request_timeout();
    match state
        .relay
        .bridge()
        .forward_with_cancel(&prompt, timeout, state.shutdown_signal())
        .await
    {
        Ok(Completion { id, content }) => {
            info!(id = %id, chars = content.len(), "Completion received from peer");
            let response = ChatCompletionResponse {
                id: format!("chatcmpl-{id}"),
                object: "chat.completion",
                created: unix_now(),
                model: state.config.model_name.clone(),
                choices: vec![Choice {
                    index: 0,
                    message: ChoiceMessage {
                        role: "assistant",
                        content,
                    },
                    finish_reason: "stop",
                }],
                usage: UsageInfo::default(),
            };
            Json(response).into_response()
        }
        Err(e) => error_response(
            bridge_error_status(&e),
            e.to_string(),
            "server_error",
            e.code(),
        ),
    }
}

/// GET /v1/models
pub async fn list_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ModelListResponse {
        object: "list",
        data: vec![ModelObject {
            id: state.config.model_name.clone(),
            object: "model",
            created: unix_now(),
            owned_by: "tabrelay",
        }],
    })
}

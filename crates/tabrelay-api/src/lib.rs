//! HTTP surface of the relay.
//!
//! - `POST /v1/chat/completions` and `GET /v1/models` speak the OpenAI shape
//! - `GET /ws` is where the browser extension connects as the peer
//! - `GET /health` reports peer and registry state

pub mod openai_compat;
pub mod routes;
pub mod server;
pub mod ws;

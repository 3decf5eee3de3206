//! Shared error types for the TabRelay system.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single forwarded request.
///
/// Every variant is a terminal outcome for one correlation entry; none of
/// them is fatal to the relay itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// No peer is connected, so the request was never registered.
    #[error("No peer connected")]
    PeerUnavailable,

    /// Writing the task to the peer failed.
    #[error("Failed to send task to peer: {0}")]
    SendFailed(String),

    /// The peer did not reply within the bound.
    #[error("Peer did not reply within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The caller gave up, or the relay is shutting down.
    #[error("Request cancelled")]
    Cancelled,
}

impl BridgeError {
    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::PeerUnavailable => "peer_unavailable",
            BridgeError::SendFailed(_) => "send_failed",
            BridgeError::Timeout(_) => "timeout",
            BridgeError::Cancelled => "cancelled",
        }
    }
}

/// Errors from reading an explicitly requested config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`crate::config::RelayConfig`].
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

//! Configuration loading from `~/.tabrelay/config.toml` with defaults.
//!
//! Every field is optional in the file; anything missing falls back to
//! [`RelayConfig::default`]. CLI flags override the loaded values.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default HTTP + WebSocket listen address (the browser extension dials port 3000).
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";

/// Default bound on a single forwarded request. Web chat UIs are slow.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Runtime configuration for the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the HTTP API and peer WebSocket listen on.
    pub listen_addr: String,
    /// Seconds to wait for the peer's reply before failing with a timeout.
    pub request_timeout_secs: u64,
    /// Model id reported in completions and `/v1/models`.
    pub model_name: String,
    /// Route the peer connects to for its WebSocket.
    pub ws_path: String,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            model_name: "gemini-web-bridge".to_string(),
            ws_path: "/ws".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// The per-request bound as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Route the peer socket is mounted at: `ws_path` with a leading `/`,
    /// or `/ws` when blank.
    pub fn ws_route(&self) -> String {
        let path = self.ws_path.trim();
        if path.is_empty() {
            "/ws".to_string()
        } else if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        }
    }

    /// Return human-readable warnings for suspicious settings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.request_timeout_secs == 0 {
            warnings.push(
                "request_timeout_secs is 0: every request will time out immediately".to_string(),
            );
        }
        if self.model_name.trim().is_empty() {
            warnings.push("model_name is empty".to_string());
        }
        if !self.ws_path.starts_with('/') {
            warnings.push(format!(
                "ws_path '{}' does not start with '/': serving the peer socket at '{}'",
                self.ws_path,
                self.ws_route()
            ));
        }
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            warnings.push(format!(
                "listen_addr '{}' is not a valid socket address",
                self.listen_addr
            ));
        }
        warnings
    }
}

/// `~/.tabrelay`, or `./.tabrelay` when no home directory is known.
pub fn tabrelay_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".tabrelay"))
        .unwrap_or_else(|| PathBuf::from(".tabrelay"))
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    tabrelay_home().join("config.toml")
}

/// Read and parse a config file, surfacing every failure.
pub fn read_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Load configuration from a TOML file, with defaults.
///
/// A missing file is normal and yields [`RelayConfig::default`]. An
/// unreadable or invalid file is an error; the caller decides whether to
/// fall back, and reports it once logging is up.
pub fn load_config(path: Option<&Path>) -> Result<RelayConfig, ConfigError> {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        return Ok(RelayConfig::default());
    }
    read_config(&config_path)
}

//! Core types shared across the TabRelay crates.
//!
//! - [`config::RelayConfig`]: runtime configuration loaded from `~/.tabrelay/config.toml`
//! - [`error::BridgeError`]: the caller-visible failure taxonomy of a forwarded request

pub mod config;
pub mod error;

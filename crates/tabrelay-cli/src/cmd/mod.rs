//! Command implementations.

pub mod ask;
pub mod config;
pub mod mock_peer;
pub mod start;

use crate::ui;

/// Build a multi-threaded runtime or exit.
pub(crate) fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            ui::error(&format!("Failed to start async runtime: {e}"));
            std::process::exit(1);
        }
    }
}

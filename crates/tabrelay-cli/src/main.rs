//! TabRelay CLI: run the relay, poke it, or pretend to be its peer.

mod cli;
mod cmd;
mod ui;

use crate::cli::*;
use clap::Parser;
use std::path::Path;
use tabrelay_types::config::{load_config, RelayConfig};
use tabrelay_types::error::ConfigError;
use tracing::warn;

fn init_tracing_stderr(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file, falling back to defaults. The failure is handed
/// back so it can be logged once the subscriber exists.
fn load_config_or_default(path: Option<&Path>) -> (RelayConfig, Option<ConfigError>) {
    match load_config(path) {
        Ok(config) => (config, None),
        Err(e) => (RelayConfig::default(), Some(e)),
    }
}

fn main() {
    let cli = Cli::parse();
    let (config, load_error) = load_config_or_default(cli.config.as_deref());
    init_tracing_stderr(&config.log_level);
    if let Some(e) = load_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }

    match cli.command {
        Commands::Start { listen, timeout } => cmd::start::cmd_start(config, listen, timeout),
        Commands::Ask { prompt, url } => cmd::ask::cmd_ask(&config, &url, &prompt),
        Commands::MockPeer {
            url,
            prefix,
            delay_ms,
        } => cmd::mock_peer::cmd_mock_peer(&url, &prefix, delay_ms),
        Commands::Status { url } => cmd::ask::cmd_status(&url),
        Commands::Config(sub) => match sub {
            ConfigCommands::Show => cmd::config::cmd_config_show(&config, cli.config.as_deref()),
        },
    }
}

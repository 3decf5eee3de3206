//! Clap CLI definitions for TabRelay.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  tabrelay start                      Run the relay on 127.0.0.1:3000
  tabrelay start --timeout 300        Allow slow replies
  tabrelay mock-peer                  Stand in for the browser extension
  tabrelay ask \"hello\"                Send one prompt through a running relay
  tabrelay status                     Show peer and pending-request state

\x1b[1;36mClients:\x1b[0m
  Point any OpenAI client at http://127.0.0.1:3000/v1, e.g.
  aider --model openai/gemini-web --openai-api-base http://127.0.0.1:3000/v1";

/// TabRelay: OpenAI-compatible relay to a browser-extension peer.
#[derive(Parser)]
#[command(name = "tabrelay", version, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the relay (HTTP API + peer WebSocket) until Ctrl+C.
    Start {
        /// Listen address, overrides `listen_addr`.
        #[arg(long)]
        listen: Option<String>,
        /// Per-request timeout in seconds, overrides `request_timeout_secs`.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Send one prompt through a running relay and print the reply.
    Ask {
        /// Prompt text.
        prompt: String,
        /// Relay base URL.
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        url: String,
    },
    /// Connect to a relay as the peer and answer every prompt.
    MockPeer {
        /// Relay WebSocket URL.
        #[arg(long, default_value = "ws://127.0.0.1:3000/ws")]
        url: String,
        /// Text prepended to each echoed prompt.
        #[arg(long, default_value = "echo: ")]
        prefix: String,
        /// Delay before answering, in milliseconds.
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
    /// Show the health of a running relay.
    Status {
        /// Relay base URL.
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        url: String,
    },
    /// Inspect configuration.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration and any warnings.
    Show,
}

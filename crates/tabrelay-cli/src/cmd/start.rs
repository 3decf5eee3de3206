//! `tabrelay start`: run the relay in the foreground.

use crate::cmd::runtime;
use crate::ui;
use tabrelay_types::config::RelayConfig;
use tracing::warn;

pub fn cmd_start(mut config: RelayConfig, listen: Option<String>, timeout: Option<u64>) {
    if let Some(listen) = listen {
        config.listen_addr = listen;
    }
    if let Some(timeout) = timeout {
        config.request_timeout_secs = timeout;
    }
    for warning in config.validate() {
        ui::warn(&warning);
    }

    ui::banner();
    ui::blank();
    ui::kv("API", &format!("http://{}/v1", config.listen_addr));
    ui::kv("Peer socket", &format!("ws://{}{}", config.listen_addr, config.ws_route()));
    ui::kv("Model", &config.model_name);
    ui::kv("Timeout", &format!("{}s", config.request_timeout_secs));
    ui::blank();
    ui::hint("Load the browser extension, or run `tabrelay mock-peer` to test");
    ui::hint("Press Ctrl+C to stop");
    ui::blank();

    let listen_addr = config.listen_addr.clone();
    let rt = runtime();
    let result = rt.block_on(tabrelay_api::server::run_server(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }));

    match result {
        Ok(()) => {
            ui::blank();
            ui::success("TabRelay stopped.");
        }
        Err(e) => {
            ui::error_with_fix(
                &format!("Relay error: {e}"),
                &format!("Check that {listen_addr} is a free, valid address"),
            );
            std::process::exit(1);
        }
    }
}

//! `tabrelay ask` and `tabrelay status`: talk to a running relay over HTTP.

use crate::cmd::runtime;
use crate::ui;
use std::time::Duration;
use tabrelay_types::config::RelayConfig;

/// Extra time the client allows on top of the relay's own timeout.
const CLIENT_GRACE: Duration = Duration::from_secs(10);

/// Pull the assistant text out of a `chat.completion` body.
fn completion_text(body: &serde_json::Value) -> Option<&str> {
    body["choices"][0]["message"]["content"].as_str()
}

/// Pull the message out of an OpenAI-style error body.
fn error_message(body: &serde_json::Value) -> String {
    body["error"]["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

pub fn cmd_ask(config: &RelayConfig, base_url: &str, prompt: &str) {
    let endpoint = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
    let request = serde_json::json!({
        "model": config.model_name,
        "messages": [{"role": "user", "content": prompt}],
    });

    let rt = runtime();
    let outcome = rt.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout() + CLIENT_GRACE)
            .build()?;
        let response = client.post(&endpoint).json(&request).send().await?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        Ok::<_, reqwest::Error>((status, body))
    });

    match outcome {
        Ok((status, body)) if status.is_success() => match completion_text(&body) {
            Some(text) => println!("{text}"),
            None => {
                ui::error("Relay returned a completion without content");
                std::process::exit(1);
            }
        },
        Ok((status, body)) => {
            ui::error(&format!("Relay answered {status}: {}", error_message(&body)));
            if status.as_u16() == 503 {
                ui::hint("No peer is connected; open the extension or run `tabrelay mock-peer`");
            }
            std::process::exit(1);
        }
        Err(e) => {
            ui::error_with_fix(
                &format!("Request to {endpoint} failed: {e}"),
                "Start the relay with `tabrelay start`",
            );
            std::process::exit(1);
        }
    }
}

pub fn cmd_status(base_url: &str) {
    let endpoint = format!("{}/health", base_url.trim_end_matches('/'));
    let rt = runtime();
    let outcome = rt.block_on(async {
        reqwest::get(&endpoint)
            .await?
            .json::<serde_json::Value>()
            .await
    });

    let body = match outcome {
        Ok(body) => body,
        Err(e) => {
            ui::error_with_fix(
                &format!("Relay not reachable at {base_url}: {e}"),
                "Start the relay with `tabrelay start`",
            );
            std::process::exit(1);
        }
    };

    ui::kv("Status", body["status"].as_str().unwrap_or("unknown"));
    if body["peer_connected"].as_bool().unwrap_or(false) {
        let label = body["peer"]["label"].as_str().unwrap_or("?");
        ui::kv_ok("Peer", &format!("connected ({label})"));
    } else {
        ui::kv_warn("Peer", "not connected");
    }
    ui::kv("Pending", &body["pending"].to_string());
    let stats = &body["stats"];
    ui::kv(
        "Served",
        &format!(
            "{} resolved / {} registered, {} stale replies",
            stats["resolved"], stats["registered"], stats["stale_replies"]
        ),
    );
}

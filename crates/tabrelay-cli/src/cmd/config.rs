//! `tabrelay config show`.

use crate::ui;
use std::path::Path;
use tabrelay_types::config::{default_config_path, RelayConfig};

pub fn cmd_config_show(config: &RelayConfig, path: Option<&Path>) {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if config_path.exists() {
        println!("# {}\n", config_path.display());
    } else {
        println!("# {} (not found, showing defaults)\n", config_path.display());
    }

    match toml::to_string_pretty(config) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => {
            ui::error(&format!("Failed to render config: {e}"));
            std::process::exit(1);
        }
    }

    let warnings = config.validate();
    if warnings.is_empty() {
        ui::success("Configuration looks good");
    } else {
        for warning in &warnings {
            ui::warn(warning);
        }
    }
}

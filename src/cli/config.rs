//! Config check command handler.

use std::path::PathBuf;

use anyhow::{Context, Result};

use psybot::config::validate::{validate_config, validate_semantics, DiagnosticLevel};
use psybot::config::Config;
use psybot::utils::string::mask_secret;

use super::common::config_path;
use super::ConfigAction;

/// Validate configuration file.
pub(crate) async fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check { config } => {
            let config_path = config_path(config);
            println!("Config file: {}", config_path.display());

            let mut diagnostics = Vec::new();
            if config_path.exists() {
                let content = std::fs::read_to_string(&config_path)
                    .context("Failed to read config file")?;
                let raw: serde_json::Value = match serde_json::from_str(&content) {
                    Ok(v) => v,
                    Err(e) => {
                        println!("[ERROR] Invalid JSON: {}", e);
                        return Ok(());
                    }
                };
                diagnostics.extend(validate_config(&raw));
            } else {
                println!("[OK] No config file found (using defaults)");
            }

            let config = match Config::load_from_path(&config_path) {
                Ok(c) => c,
                Err(e) => {
                    println!("[ERROR] {}", e);
                    return Ok(());
                }
            };
            diagnostics.extend(validate_semantics(&config));

            println!("Telegram token: {}", mask_secret(&config.telegram.token));
            println!("Transport: {}", config.transport.mode());
            let key = config
                .providers
                .active_entry()
                .and_then(|e| e.api_key())
                .unwrap_or("");
            println!(
                "Active provider: {} (api key {})",
                config.providers.active,
                mask_secret(key)
            );
            println!();

            for diag in &diagnostics {
                println!("{}", diag);
            }

            let errors = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Error)
                .count();
            let warnings = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Warn)
                .count();

            if errors == 0 && warnings == 0 {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} error(s), {} warning(s)", errors, warnings);
            }
        }
    }
    Ok(())
}

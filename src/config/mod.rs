//! Configuration management for PsyBot
//!
//! Configuration is loaded from `~/.psybot/config.json` (or an explicit path)
//! and then overlaid with environment variables. The plain variable names the
//! bot has always used (`TELEGRAM_BOT_TOKEN`, `OPENROUTER_API_KEY`, `PORT`, ...)
//! are honored alongside `PSYBOT_SECTION_KEY` overrides.

mod types;
pub mod validate;

pub use types::*;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BotError, Result};
use crate::log_component;

impl Config {
    /// Returns the PsyBot configuration directory path (~/.psybot)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".psybot")
    }

    /// Returns the path to the config file (~/.psybot/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// A missing file yields the default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse the file at `path` without applying environment overrides.
    pub fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(component = "config", path = %path.display(), "config file not found, using defaults");
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| BotError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides read through `lookup`.
    ///
    /// Variables (later entries win over earlier ones for the same field):
    /// - `TELEGRAM_BOT_TOKEN`, `PSYBOT_TELEGRAM_TOKEN`
    /// - `PSYBOT_TELEGRAM_ALLOW_FROM` (comma separated user ids)
    /// - `OPENROUTER_API_KEY` (also used by `qwen` when it has no key of its own), `QWEN_API_KEY`
    /// - `API_PROVIDER`, `PSYBOT_PROVIDERS_ACTIVE`
    /// - `PORT`, `PSYBOT_HEALTH_PORT`
    /// - `PSYBOT_WEBHOOK_URL` (switches the transport to webhook)
    /// - `PSYBOT_RATE_LIMIT_MAX_REQUESTS`, `PSYBOT_RATE_LIMIT_WINDOW_MS`
    /// - `PSYBOT_VALIDATION_MIN_LENGTH`, `PSYBOT_VALIDATION_MAX_LENGTH`
    /// - `PSYBOT_LOG_LEVEL`, `PSYBOT_LOG_FORMAT`
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Telegram
        for key in ["TELEGRAM_BOT_TOKEN", "PSYBOT_TELEGRAM_TOKEN"] {
            if let Some(val) = get(key) {
                self.telegram.token = val;
            }
        }
        if let Some(val) = get("PSYBOT_TELEGRAM_ALLOW_FROM") {
            self.telegram.allow_from = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        // Providers
        self.apply_provider_env_overrides(&get);

        // Transport
        if let Some(url) = get("PSYBOT_WEBHOOK_URL") {
            self.transport = match std::mem::take(&mut self.transport) {
                TransportConfig::Webhook {
                    listen_host,
                    listen_port,
                    ..
                } => TransportConfig::Webhook {
                    url,
                    listen_host,
                    listen_port,
                },
                TransportConfig::Polling => TransportConfig::Webhook {
                    url,
                    listen_host: DEFAULT_WEBHOOK_HOST.to_string(),
                    listen_port: DEFAULT_WEBHOOK_PORT,
                },
            };
        }

        // Health
        for key in ["PORT", "PSYBOT_HEALTH_PORT"] {
            if let Some(v) = get(key).and_then(|v| v.trim().parse().ok()) {
                self.health.port = v;
            }
        }

        // Rate limit
        if let Some(v) = get("PSYBOT_RATE_LIMIT_MAX_REQUESTS").and_then(|v| v.parse().ok()) {
            self.rate_limit.max_requests = v;
        }
        if let Some(v) = get("PSYBOT_RATE_LIMIT_WINDOW_MS").and_then(|v| v.parse().ok()) {
            self.rate_limit.window_ms = v;
        }

        // Validation
        if let Some(v) = get("PSYBOT_VALIDATION_MIN_LENGTH").and_then(|v| v.parse().ok()) {
            self.validation.min_length = v;
        }
        if let Some(v) = get("PSYBOT_VALIDATION_MAX_LENGTH").and_then(|v| v.parse().ok()) {
            self.validation.max_length = v;
        }

        // Logging
        if let Some(val) = get("PSYBOT_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = get("PSYBOT_LOG_FORMAT") {
            match val.to_ascii_lowercase().as_str() {
                "pretty" => self.logging.format = LogFormat::Pretty,
                "component" => self.logging.format = LogFormat::Component,
                "json" => self.logging.format = LogFormat::Json,
                other => {
                    log_component!(warn, "config", "ignoring unknown PSYBOT_LOG_FORMAT", value = other)
                }
            }
        }
    }

    fn apply_provider_env_overrides<G>(&mut self, get: &G)
    where
        G: Fn(&str) -> Option<String>,
    {
        if let Some(key) = get("OPENROUTER_API_KEY") {
            self.providers
                .entries
                .entry("openrouter".to_string())
                .or_default()
                .api_key = Some(key.clone());
            if let Some(qwen) = self.providers.entries.get_mut("qwen") {
                if qwen.api_key().is_none() {
                    qwen.api_key = Some(key);
                }
            }
        }
        if let Some(key) = get("QWEN_API_KEY") {
            if let Some(qwen) = self.providers.entries.get_mut("qwen") {
                qwen.api_key = Some(key);
            }
        }
        for var in ["API_PROVIDER", "PSYBOT_PROVIDERS_ACTIVE"] {
            if let Some(name) = get(var) {
                self.providers.active = name.trim().to_lowercase();
            }
        }
    }
}

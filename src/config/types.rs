//! Configuration type definitions for PsyBot
//!
//! Every struct implements serde traits for JSON and has defaults that match
//! a working bot, so an empty `{}` config file plus a token is enough to run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitConfig;
use crate::utils::split::SplitConfig;
use crate::validation::ValidationConfig;

/// Main configuration struct for PsyBot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram bot credentials and access control
    pub telegram: TelegramConfig,
    /// How updates reach the bot (long polling or webhook)
    pub transport: TransportConfig,
    /// Completion endpoints and the active selection
    pub providers: ProvidersConfig,
    /// Query length bounds and spam rules
    pub validation: ValidationConfig,
    /// Per-user request quota
    pub rate_limit: RateLimitConfig,
    /// Outbound message chunking
    pub split: SplitConfig,
    /// Health endpoint
    pub health: HealthConfig,
    /// Log output
    pub logging: LoggingConfig,
}

// ============================================================================
// Telegram Configuration
// ============================================================================

/// Telegram channel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    pub token: String,
    /// User ids allowed to talk to the bot. Empty means no allowlist.
    pub allow_from: Vec<String>,
    /// With an empty allowlist, refuse everyone instead of serving everyone.
    pub deny_by_default: bool,
}

impl TelegramConfig {
    /// Whether `user_id` may use the bot.
    pub fn is_allowed(&self, user_id: &str) -> bool {
        if self.allow_from.is_empty() {
            return !self.deny_by_default;
        }
        self.allow_from.iter().any(|allowed| allowed == user_id)
    }
}

// ============================================================================
// Transport Configuration
// ============================================================================

/// Update delivery mode, chosen once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TransportConfig {
    /// getUpdates long polling.
    #[default]
    Polling,
    /// Telegram pushes updates to `url`; the bot listens on `listen_host:listen_port`.
    Webhook {
        /// Public HTTPS URL registered with Telegram, including the path.
        url: String,
        #[serde(default = "default_webhook_host")]
        listen_host: String,
        #[serde(default = "default_webhook_port")]
        listen_port: u16,
    },
}

/// Default webhook listen address.
pub const DEFAULT_WEBHOOK_HOST: &str = "0.0.0.0";
/// Default webhook listen port.
pub const DEFAULT_WEBHOOK_PORT: u16 = 8443;
/// Path used when a webhook URL is built from a bare host.
pub const DEFAULT_WEBHOOK_PATH: &str = "/telegram-webhook";

fn default_webhook_host() -> String {
    DEFAULT_WEBHOOK_HOST.to_string()
}

fn default_webhook_port() -> u16 {
    DEFAULT_WEBHOOK_PORT
}

impl TransportConfig {
    /// Short name for logs.
    pub fn mode(&self) -> &'static str {
        match self {
            TransportConfig::Polling => "polling",
            TransportConfig::Webhook { .. } => "webhook",
        }
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// OpenRouter API base.
pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
/// Model used by the `openrouter` preset.
pub const OPENROUTER_DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3-0324:free";
/// Model used by the `qwen` preset (served through OpenRouter).
pub const QWEN_DEFAULT_MODEL: &str = "qwen/qwen3-235b-a22b:free";
/// Name of the provider active when nothing else is configured.
pub const DEFAULT_PROVIDER: &str = "openrouter";

/// One OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL; `/chat/completions` is appended.
    pub api_base: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Model identifier sent with each request
    pub model: String,
    /// Completion token cap
    pub max_tokens: u32,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: OPENROUTER_API_BASE.to_string(),
            api_key: None,
            model: OPENROUTER_DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            timeout_ms: 30_000,
        }
    }
}

impl ProviderConfig {
    /// The API key, if set and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Configured completion endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Provider used at startup; `/api` can switch among `entries` later.
    pub active: String,
    /// Provider name to endpoint settings.
    pub entries: BTreeMap<String, ProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("openrouter".to_string(), ProviderConfig::default());
        entries.insert(
            "qwen".to_string(),
            ProviderConfig {
                model: QWEN_DEFAULT_MODEL.to_string(),
                ..Default::default()
            },
        );
        Self {
            active: DEFAULT_PROVIDER.to_string(),
            entries,
        }
    }
}

impl ProvidersConfig {
    /// The entry selected by `active`.
    pub fn active_entry(&self) -> Option<&ProviderConfig> {
        self.entries.get(&self.active)
    }

    /// Configured provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

// ============================================================================
// Health Configuration
// ============================================================================

/// Health server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Whether to serve `/health` and `/ready`.
    pub enabled: bool,
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Interval for logging usage counters (0 disables).
    pub usage_log_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 3000,
            usage_log_interval_secs: 300,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    #[default]
    Component,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Append to this file instead of stderr
    pub file: Option<String>,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            file: None,
            level: "info".to_string(),
        }
    }
}

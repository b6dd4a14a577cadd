//! Configuration validation.
//!
//! Two passes: [`validate_config`] checks the raw JSON for unknown field
//! names (with "did you mean" suggestions), and [`validate_semantics`] checks
//! the parsed [`Config`] for values the bot cannot run with.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::config::{Config, TransportConfig};
use crate::utils::split::TELEGRAM_MAX_MESSAGE_LENGTH;
use crate::validation::SpamRule;

/// Known top-level config field names.
/// Shape of a BotFather token: numeric bot id, colon, secret.
static TELEGRAM_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+:[A-Za-z0-9_-]{20,}$").unwrap());

const KNOWN_TOP_LEVEL: &[&str] = &[
    "telegram",
    "transport",
    "providers",
    "validation",
    "rate_limit",
    "split",
    "health",
    "logging",
];

/// Known fields for each section.
const KNOWN_SECTIONS: &[(&str, &[&str])] = &[
    ("telegram", &["token", "allow_from", "deny_by_default"]),
    ("transport", &["mode", "url", "listen_host", "listen_port"]),
    ("providers", &["active", "entries"]),
    ("validation", &["min_length", "max_length", "spam_rules"]),
    ("rate_limit", &["max_requests", "window_ms", "sweep_interval_secs"]),
    ("split", &["max_chunk_length"]),
    ("health", &["enabled", "host", "port", "usage_log_interval_secs"]),
    ("logging", &["format", "file", "level"]),
];

const KNOWN_PROVIDER_ENTRY: &[&str] = &["api_base", "api_key", "model", "max_tokens", "timeout_ms"];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Ok,
            path: String::new(),
            message: message.into(),
        }
    }

    fn warn(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warn,
            path: path.into(),
            message: message.into(),
        }
    }

    fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Whether any diagnostic is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics
        .iter()
        .any(|d| d.level == DiagnosticLevel::Error)
}

/// Levenshtein distance over chars, for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn check_keys(
    obj: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut has_unknown = false;
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        has_unknown = true;
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let msg = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}', {}", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        diagnostics.push(Diagnostic::error(path, msg));
    }
    has_unknown
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::error("", "Config must be a JSON object"));
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic::ok("Valid JSON"));

    let mut has_unknown = check_keys(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);

    for (section, known) in KNOWN_SECTIONS {
        if let Some(section_obj) = obj.get(*section).and_then(|v| v.as_object()) {
            has_unknown |= check_keys(section_obj, known, section, &mut diagnostics);
        }
    }

    if let Some(entries) = obj
        .get("providers")
        .and_then(|v| v.get("entries"))
        .and_then(|v| v.as_object())
    {
        for (name, entry) in entries {
            if let Some(entry_obj) = entry.as_object() {
                let prefix = format!("providers.entries.{}", name);
                has_unknown |= check_keys(entry_obj, KNOWN_PROVIDER_ENTRY, &prefix, &mut diagnostics);
            }
        }
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::ok("All fields recognized"));
    }

    diagnostics
}

/// Check a parsed config for values the bot cannot run with.
///
/// Errors block startup; warnings are logged and the bot still starts.
pub fn validate_semantics(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    // Telegram
    if config.telegram.token.trim().is_empty() {
        diagnostics.push(Diagnostic::error(
            "telegram.token",
            "Bot token is empty (set TELEGRAM_BOT_TOKEN)",
        ));
    } else if !TELEGRAM_TOKEN_RE.is_match(config.telegram.token.trim()) {
        diagnostics.push(Diagnostic::warn(
            "telegram.token",
            "Does not look like a BotFather token (<id>:<secret>)",
        ));
    }
    if config.telegram.allow_from.is_empty() && !config.telegram.deny_by_default {
        diagnostics.push(Diagnostic::warn(
            "telegram.allow_from",
            "Empty, anyone can message the bot",
        ));
    }

    // Transport
    if let TransportConfig::Webhook { url, .. } = &config.transport {
        if url.trim().is_empty() {
            diagnostics.push(Diagnostic::error(
                "transport.url",
                "Webhook mode needs a public URL",
            ));
        } else if let Err(e) = reqwest::Url::parse(url) {
            diagnostics.push(Diagnostic::error(
                "transport.url",
                format!("Invalid webhook URL: {}", e),
            ));
        } else if !url.starts_with("https://") {
            diagnostics.push(Diagnostic::warn(
                "transport.url",
                "Telegram only delivers webhooks over HTTPS",
            ));
        }
    }

    // Providers
    match config.providers.active_entry() {
        None => diagnostics.push(Diagnostic::error(
            "providers.active",
            format!(
                "Unknown provider '{}' (available: {})",
                config.providers.active,
                config.providers.names().join(", ")
            ),
        )),
        Some(entry) if entry.api_key().is_none() => diagnostics.push(Diagnostic::warn(
            format!("providers.entries.{}.api_key", config.providers.active),
            "No API key (set OPENROUTER_API_KEY)",
        )),
        Some(_) => {}
    }
    for (name, entry) in &config.providers.entries {
        if reqwest::Url::parse(&entry.api_base).is_err() {
            diagnostics.push(Diagnostic::error(
                format!("providers.entries.{}.api_base", name),
                format!("Invalid URL '{}'", entry.api_base),
            ));
        }
        if entry.max_tokens == 0 {
            diagnostics.push(Diagnostic::error(
                format!("providers.entries.{}.max_tokens", name),
                "Must be greater than 0",
            ));
        }
        if entry.timeout_ms == 0 {
            diagnostics.push(Diagnostic::error(
                format!("providers.entries.{}.timeout_ms", name),
                "Must be greater than 0",
            ));
        }
    }

    // Validation
    let validation = &config.validation;
    if validation.min_length > validation.max_length {
        diagnostics.push(Diagnostic::error(
            "validation",
            format!(
                "min_length ({}) is greater than max_length ({})",
                validation.min_length, validation.max_length
            ),
        ));
    }
    for (i, rule) in validation.spam_rules.iter().enumerate() {
        let path = format!("validation.spam_rules[{}]", i);
        match rule {
            SpamRule::RepeatedChar { min_run } if *min_run < 2 => {
                diagnostics.push(Diagnostic::error(path, "min_run must be at least 2"));
            }
            SpamRule::Shouting { min_length } if *min_length == 0 => {
                diagnostics.push(Diagnostic::error(path, "min_length must be greater than 0"));
            }
            SpamRule::Pattern { name, .. } if name.trim().is_empty() => {
                diagnostics.push(Diagnostic::warn(path, "Pattern rule has no name"));
            }
            _ => {}
        }
    }

    // Rate limit
    if config.rate_limit.max_requests == 0 {
        diagnostics.push(Diagnostic::error(
            "rate_limit.max_requests",
            "Must be greater than 0",
        ));
    }
    if config.rate_limit.window_ms == 0 {
        diagnostics.push(Diagnostic::error(
            "rate_limit.window_ms",
            "Must be greater than 0",
        ));
    }

    // Split
    if config.split.max_chunk_length == 0 {
        diagnostics.push(Diagnostic::error(
            "split.max_chunk_length",
            "Must be greater than 0",
        ));
    } else if config.split.max_chunk_length > TELEGRAM_MAX_MESSAGE_LENGTH {
        diagnostics.push(Diagnostic::warn(
            "split.max_chunk_length",
            format!(
                "Above Telegram's limit of {}, long replies will be rejected",
                TELEGRAM_MAX_MESSAGE_LENGTH
            ),
        ));
    }

    if !has_errors(&diagnostics) {
        diagnostics.push(Diagnostic::ok("Configuration is usable"));
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn runnable() -> Config {
        let mut config = Config::default();
        config.telegram.token = "123456:AAEabcdefghijklmnopqrstuvwxyz012".to_string();
        config.telegram.allow_from = vec!["42".to_string()];
        config
            .providers
            .entries
            .get_mut("openrouter")
            .unwrap()
            .api_key = Some("sk-or".to_string());
        config
    }

    fn errors_at(diags: &[Diagnostic], path: &str) -> bool {
        diags
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error && d.path == path)
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("hello", "hello"), 0);
        assert_eq!(levenshtein("hello", "helo"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("лимит", "лимиты"), 1);
        assert!(levenshtein("hello", "world") > 3);
    }

    #[test]
    fn test_suggest_field() {
        let result = suggest_field("rate_limt", KNOWN_TOP_LEVEL);
        assert!(result.unwrap().contains("rate_limit"));
        assert!(suggest_field("xyzabcdef", KNOWN_TOP_LEVEL).is_none());
    }

    #[test]
    fn test_validate_known_fields() {
        let raw = json!({
            "telegram": {"token": "x"},
            "rate_limit": {"max_requests": 5},
            "providers": {"entries": {"openrouter": {"model": "m"}}}
        });
        let diags = validate_config(&raw);
        assert!(!has_errors(&diags));
        assert!(diags.iter().any(|d| d.message == "All fields recognized"));
    }

    #[test]
    fn test_validate_unknown_fields() {
        let raw = json!({
            "telegarm": {},
            "validation": {"max_lenght": 10},
            "providers": {"entries": {"qwen": {"modle": "q"}}}
        });
        let diags = validate_config(&raw);
        assert!(errors_at(&diags, "telegarm"));
        assert!(errors_at(&diags, "validation.max_lenght"));
        assert!(errors_at(&diags, "providers.entries.qwen.modle"));
        assert!(diags
            .iter()
            .any(|d| d.message.contains("did you mean 'max_length'?")));
    }

    #[test]
    fn test_validate_not_an_object() {
        let diags = validate_config(&json!("not an object"));
        assert!(diags
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error && d.message.contains("must be a JSON object")));
    }

    #[test]
    fn test_runnable_config_has_no_errors() {
        let diags = validate_semantics(&runnable());
        assert!(!has_errors(&diags), "{:?}", diags);
        assert!(diags.iter().all(|d| d.level == DiagnosticLevel::Ok));
    }

    #[test]
    fn test_default_config_needs_token() {
        let diags = validate_semantics(&Config::default());
        assert!(errors_at(&diags, "telegram.token"));
        assert!(diags
            .iter()
            .any(|d| d.level == DiagnosticLevel::Warn && d.message.contains("anyone can message")));
    }

    #[test]
    fn test_malformed_token_is_warning() {
        let mut config = runnable();
        config.telegram.token = "not-a-token".to_string();
        let diags = validate_semantics(&config);
        assert!(!has_errors(&diags));
        assert!(diags
            .iter()
            .any(|d| d.level == DiagnosticLevel::Warn && d.path == "telegram.token"));
    }

    #[test]
    fn test_min_greater_than_max() {
        let mut config = runnable();
        config.validation.min_length = 10;
        config.validation.max_length = 5;
        assert!(errors_at(&validate_semantics(&config), "validation"));
    }

    #[test]
    fn test_zero_rate_limit() {
        let mut config = runnable();
        config.rate_limit.max_requests = 0;
        config.rate_limit.window_ms = 0;
        let diags = validate_semantics(&config);
        assert!(errors_at(&diags, "rate_limit.max_requests"));
        assert!(errors_at(&diags, "rate_limit.window_ms"));
    }

    #[test]
    fn test_unknown_active_provider() {
        let mut config = runnable();
        config.providers.active = "gpt-local".to_string();
        let diags = validate_semantics(&config);
        assert!(errors_at(&diags, "providers.active"));
        assert!(diags
            .iter()
            .any(|d| d.message.contains("available: openrouter, qwen")));
    }

    #[test]
    fn test_webhook_without_url() {
        let mut config = runnable();
        config.transport = TransportConfig::Webhook {
            url: String::new(),
            listen_host: "0.0.0.0".to_string(),
            listen_port: 8443,
        };
        assert!(errors_at(&validate_semantics(&config), "transport.url"));

        config.transport = TransportConfig::Webhook {
            url: "not a url".to_string(),
            listen_host: "0.0.0.0".to_string(),
            listen_port: 8443,
        };
        assert!(errors_at(&validate_semantics(&config), "transport.url"));
    }

    #[test]
    fn test_bad_spam_rule_thresholds() {
        let mut config = runnable();
        config.validation.spam_rules = vec![
            SpamRule::RepeatedChar { min_run: 1 },
            SpamRule::Shouting { min_length: 0 },
        ];
        let diags = validate_semantics(&config);
        assert!(errors_at(&diags, "validation.spam_rules[0]"));
        assert!(errors_at(&diags, "validation.spam_rules[1]"));
    }

    #[test]
    fn test_chunk_length_bounds() {
        let mut config = runnable();
        config.split.max_chunk_length = 0;
        assert!(errors_at(&validate_semantics(&config), "split.max_chunk_length"));

        config.split.max_chunk_length = 5000;
        let diags = validate_semantics(&config);
        assert!(!has_errors(&diags));
        assert!(diags
            .iter()
            .any(|d| d.level == DiagnosticLevel::Warn && d.path == "split.max_chunk_length"));
    }

    #[test]
    fn test_missing_api_key_is_warning() {
        let mut config = runnable();
        config.providers.entries.get_mut("openrouter").unwrap().api_key = None;
        let diags = validate_semantics(&config);
        assert!(!has_errors(&diags));
        assert!(diags
            .iter()
            .any(|d| d.level == DiagnosticLevel::Warn && d.path.ends_with("api_key")));
    }
}

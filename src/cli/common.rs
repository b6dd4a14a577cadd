//! Shared CLI helpers used across multiple command handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::warn;

use psybot::bot::QueryHandler;
use psybot::config::validate::{has_errors, validate_semantics, DiagnosticLevel};
use psybot::config::Config;
use psybot::health::BotMetrics;
use psybot::providers::ProviderRegistry;
use psybot::rate_limit::FixedWindowRateLimiter;

/// Config path from `--config`, or the default location.
pub(crate) fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(Config::path)
}

/// Load config with environment overrides applied.
pub(crate) fn load_config(path: &Path) -> Result<Config> {
    Config::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Refuse to start on semantic errors; log warnings.
///
/// With `require_token` false the Telegram token is not needed (`ask`).
pub(crate) fn ensure_usable(config: &Config, require_token: bool) -> Result<()> {
    let diagnostics: Vec<_> = validate_semantics(config)
        .into_iter()
        .filter(|d| require_token || d.path != "telegram.token")
        .collect();

    for diag in &diagnostics {
        if diag.level == DiagnosticLevel::Warn {
            warn!(path = %diag.path, "{}", diag.message);
        }
    }

    if has_errors(&diagnostics) {
        let errors: Vec<String> = diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .map(|d| d.to_string())
            .collect();
        bail!("Invalid configuration:\n{}", errors.join("\n"));
    }
    Ok(())
}

/// Everything the query pipeline needs, wired from config.
pub(crate) struct Pipeline {
    pub handler: Arc<QueryHandler>,
    pub limiter: Arc<FixedWindowRateLimiter>,
    pub metrics: Arc<BotMetrics>,
}

pub(crate) fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let providers = Arc::new(
        ProviderRegistry::from_config(&config.providers)
            .context("Failed to set up completion providers")?,
    );
    let limiter = Arc::new(FixedWindowRateLimiter::new(config.rate_limit.clone()));
    let metrics = Arc::new(BotMetrics::new());
    let handler = Arc::new(QueryHandler::from_config(
        config,
        Arc::clone(&limiter),
        providers,
        Arc::clone(&metrics),
    ));
    Ok(Pipeline {
        handler,
        limiter,
        metrics,
    })
}

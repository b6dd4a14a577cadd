//! Query pipeline: validate, rate limit, complete, clean up, split.
//!
//! Transport-agnostic. The Telegram channel and the `ask` CLI command both
//! drive the same [`QueryHandler`]; the channel uses the two-step
//! [`admit`](QueryHandler::admit) / [`answer`](QueryHandler::answer) form so it
//! can post the "please wait" notice in between.

use std::sync::Arc;

use crate::bot::messages;
use crate::bot::prompt::PSY_PROMPT;
use crate::config::Config;
use crate::error::ErrorCategory;
use crate::health::BotMetrics;
use crate::log_component;
use crate::providers::{ChatMessage, ChatOptions, ProviderRegistry};
use crate::rate_limit::FixedWindowRateLimiter;
use crate::utils::markdown::strip_markdown;
use crate::utils::split::{split_message, SplitConfig};
use crate::utils::string::preview;
use crate::validation::{validate, RejectReason, ValidationConfig, ValidationResult};

/// Final result of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Completion text, cleaned and split into sendable chunks.
    Reply(Vec<String>),
    /// Refused by validation.
    Rejected { reason: RejectReason },
    /// Refused by the rate limiter.
    RateLimited { retry_after_ms: Option<u64> },
    /// The completion call failed.
    Failed { category: ErrorCategory },
}

impl Outcome {
    /// Messages to send to the user, in order.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Outcome::Reply(chunks) => chunks.clone(),
            Outcome::Rejected { reason } => vec![messages::rejection_message(*reason).to_string()],
            Outcome::RateLimited { .. } => vec![messages::RATE_LIMIT.to_string()],
            Outcome::Failed { category } => vec![messages::error_message(*category).to_string()],
        }
    }
}

/// Result of the cheap pre-flight checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Passed validation and consumed a rate-limit slot.
    Admitted { query: String },
    /// Stopped before the provider; the outcome is final.
    Refused(Outcome),
}

/// Orchestrates one user query end to end.
pub struct QueryHandler {
    validation: ValidationConfig,
    split: SplitConfig,
    limiter: Arc<FixedWindowRateLimiter>,
    providers: Arc<ProviderRegistry>,
    metrics: Arc<BotMetrics>,
}

impl QueryHandler {
    pub fn new(
        validation: ValidationConfig,
        split: SplitConfig,
        limiter: Arc<FixedWindowRateLimiter>,
        providers: Arc<ProviderRegistry>,
        metrics: Arc<BotMetrics>,
    ) -> Self {
        Self {
            validation,
            split,
            limiter,
            providers,
            metrics,
        }
    }

    /// Handler using the validation and split sections of `config`.
    pub fn from_config(
        config: &Config,
        limiter: Arc<FixedWindowRateLimiter>,
        providers: Arc<ProviderRegistry>,
        metrics: Arc<BotMetrics>,
    ) -> Self {
        Self::new(
            config.validation.clone(),
            config.split.clone(),
            limiter,
            providers,
            metrics,
        )
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    pub fn limiter(&self) -> &Arc<FixedWindowRateLimiter> {
        &self.limiter
    }

    pub fn metrics(&self) -> &Arc<BotMetrics> {
        &self.metrics
    }

    /// Validate `raw` and consume a rate-limit slot for `user_id`.
    ///
    /// Rejected input never touches the limiter.
    pub fn admit(&self, user_id: &str, raw: &str) -> Admission {
        self.metrics.record_request();

        let query = match validate(raw, &self.validation) {
            ValidationResult::Accepted { sanitized_query } => sanitized_query,
            ValidationResult::Rejected { reason } => {
                self.metrics.record_rejection(reason);
                log_component!(info, "handler", "query rejected", user = user_id, reason = reason.as_str());
                return Admission::Refused(Outcome::Rejected { reason });
            }
        };

        if self.limiter.check_and_consume(user_id) {
            self.metrics.record_rate_limited();
            let retry_after_ms = self.limiter.retry_after_ms(user_id);
            log_component!(info, "handler", "query rate limited", user = user_id);
            return Admission::Refused(Outcome::RateLimited { retry_after_ms });
        }

        Admission::Admitted { query }
    }

    /// Run an admitted query through the active provider.
    pub async fn answer(&self, user_id: &str, query: &str) -> Outcome {
        let provider = match self.providers.active() {
            Some(p) => p,
            None => {
                log_component!(error, "handler", "active provider is not configured", provider = self.providers.active_name());
                self.metrics.record_error(ErrorCategory::Api);
                return Outcome::Failed {
                    category: ErrorCategory::Api,
                };
            }
        };

        log_component!(
            info,
            "handler",
            "query received",
            user = user_id,
            provider = provider.name(),
            query = preview(query, 80)
        );

        let messages = vec![ChatMessage::system(PSY_PROMPT), ChatMessage::user(query)];
        match provider.complete(messages, ChatOptions::default()).await {
            Ok(completion) => {
                if let Some(usage) = completion.usage {
                    self.metrics.record_tokens(
                        u64::from(usage.prompt_tokens),
                        u64::from(usage.completion_tokens),
                    );
                }
                let cleaned = strip_markdown(&completion.content);
                if cleaned.trim().is_empty() {
                    self.metrics.record_error(ErrorCategory::Api);
                    log_component!(
                        warn,
                        "handler",
                        "completion empty after markdown cleanup",
                        user = user_id,
                        provider = provider.name()
                    );
                    return Outcome::Failed {
                        category: ErrorCategory::Api,
                    };
                }
                let chunks = split_message(&cleaned, self.split.max_chunk_length);
                self.metrics.record_reply(chunks.len());
                log_component!(info, "handler", "reply generated", user = user_id, chunks = chunks.len());
                Outcome::Reply(chunks)
            }
            Err(err) => {
                let category = err.category();
                self.metrics.record_error(category);
                log_component!(
                    warn,
                    "handler",
                    "completion failed",
                    user = user_id,
                    provider = provider.name(),
                    error = err.to_string()
                );
                Outcome::Failed { category }
            }
        }
    }

    /// [`admit`](Self::admit) then [`answer`](Self::answer).
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use psybot::health::BotMetrics;
    /// # use psybot::utils::split::SplitConfig;
    /// # use psybot::{FixedWindowRateLimiter, Outcome, ProviderRegistry, QueryHandler};
    /// # use psybot::{RateLimitConfig, RejectReason, ValidationConfig};
    /// # tokio_test::block_on(async {
    /// let handler = QueryHandler::new(
    ///     ValidationConfig::default(),
    ///     SplitConfig::default(),
    ///     Arc::new(FixedWindowRateLimiter::new(RateLimitConfig::default())),
    ///     Arc::new(ProviderRegistry::new("openrouter")),
    ///     Arc::new(BotMetrics::new()),
    /// );
    /// let outcome = handler.handle_query("42", "   ").await;
    /// assert_eq!(outcome, Outcome::Rejected { reason: RejectReason::Empty });
    /// # });
    /// ```
    pub async fn handle_query(&self, user_id: &str, raw: &str) -> Outcome {
        match self.admit(user_id, raw) {
            Admission::Admitted { query } => self.answer(user_id, &query).await,
            Admission::Refused(outcome) => outcome,
        }
    }

    /// Handle `/api <name>`, returning the reply text.
    pub fn switch_provider(&self, name: &str) -> String {
        let name = name.trim();
        if name.is_empty() {
            return messages::api_usage(&self.providers.names());
        }
        match self.providers.switch(name) {
            Ok(()) => messages::api_switched(&self.providers.active_name()),
            Err(err) => messages::api_invalid(&err.available),
        }
    }
}

//! Telegram channel.
//!
//! Receives updates through teloxide (long polling or an axum webhook
//! listener) and drives every question through the shared [`QueryHandler`].
//!
//! ```text
//! ┌──────────────────┐         ┌──────────────────┐        ┌──────────────┐
//! │   Telegram API   │ ──────> │  TelegramChannel │ ─────> │ QueryHandler │
//! │                  │ <────── │   (teloxide)     │ <───── │              │
//! └──────────────────┘         └──────────────────┘        └──────────────┘
//! ```
//!
//! A question goes out as: "please wait" notice, then each reply chunk in
//! order. Refusals (validation, rate limit) skip the notice.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use teloxide::utils::command::BotCommands;
use teloxide::RequestError;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bot::{messages, Admission, QueryHandler};
use crate::config::{TelegramConfig, TransportConfig};
use crate::error::{BotError, Result};
use crate::health::{HealthCheck, HealthRegistry, HealthStatus};
use crate::utils::string::preview;

/// Maximum number of startup connectivity retries before giving up.
const MAX_STARTUP_RETRIES: u32 = 10;
/// Base delay (in seconds) for exponential backoff on startup retries.
const BASE_RETRY_DELAY_SECS: u64 = 2;
/// Maximum delay (in seconds) for exponential backoff on startup retries.
const MAX_RETRY_DELAY_SECS: u64 = 120;

/// Name of the health check this channel maintains.
pub const HEALTH_CHECK: &str = "telegram";

type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Commands the bot understands.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
pub enum Command {
    #[command(description = "Начать работу с ботом")]
    Start,
    #[command(description = "Показать справку")]
    Help,
    #[command(description = "Получить психологический анализ")]
    Psy(String),
    #[command(description = "Сменить модель")]
    Api(String),
}

/// State shared with every update handler.
struct ChannelState {
    config: TelegramConfig,
    handler: Arc<QueryHandler>,
}

/// Telegram front end for the bot.
pub struct TelegramChannel {
    config: TelegramConfig,
    transport: TransportConfig,
    handler: Arc<QueryHandler>,
    health: HealthRegistry,
}

impl TelegramChannel {
    pub fn new(
        config: TelegramConfig,
        transport: TransportConfig,
        handler: Arc<QueryHandler>,
        health: HealthRegistry,
    ) -> Self {
        health.register(HealthCheck::new(HEALTH_CHECK, HealthStatus::Degraded));
        Self {
            config,
            transport,
            handler,
            health,
        }
    }

    /// Calculates the exponential backoff delay for a startup retry attempt.
    pub fn startup_backoff_delay(attempt: u32) -> Duration {
        let delay_secs = BASE_RETRY_DELAY_SECS
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(MAX_RETRY_DELAY_SECS);
        Duration::from_secs(delay_secs)
    }

    /// Build a Telegram bot client with system proxy detection disabled.
    fn build_bot(token: &str) -> Result<Bot> {
        let client = teloxide::net::default_reqwest_settings()
            .no_proxy()
            .build()
            .map_err(|e| {
                BotError::Channel(format!("Failed to build Telegram HTTP client: {}", e))
            })?;
        Ok(Bot::with_client(token.to_string(), client))
    }

    /// Wait until `getMe` succeeds.
    ///
    /// Transient failures (network, I/O, flood control) are retried with
    /// backoff; anything else fails immediately. Returns `Ok(false)` when
    /// shutdown was requested while waiting.
    async fn wait_until_reachable(
        &self,
        bot: &Bot,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<bool> {
        let mut attempt: u32 = 0;
        loop {
            match bot.get_me().await {
                Ok(me) => {
                    info!(username = %me.username(), "Telegram bot authenticated");
                    self.health.update(HEALTH_CHECK, HealthStatus::Ok, None);
                    return Ok(true);
                }
                Err(e) => {
                    let is_transient = matches!(
                        &e,
                        RequestError::Network(_) | RequestError::Io(_) | RequestError::RetryAfter(_)
                    );

                    if !is_transient || attempt >= MAX_STARTUP_RETRIES {
                        error!(
                            "Telegram startup check failed after {} attempt(s): {}",
                            attempt + 1,
                            e
                        );
                        self.health
                            .update(HEALTH_CHECK, HealthStatus::Down, Some(e.to_string()));
                        return Err(BotError::Channel(format!(
                            "Telegram startup check failed: {}",
                            e
                        )));
                    }

                    let delay = Self::startup_backoff_delay(attempt);
                    warn!(
                        "Telegram startup check failed (attempt {}/{}), retrying in {}s: {}",
                        attempt + 1,
                        MAX_STARTUP_RETRIES,
                        delay.as_secs(),
                        e
                    );
                    self.health.update(
                        HEALTH_CHECK,
                        HealthStatus::Degraded,
                        Some(format!("retrying: {}", e)),
                    );
                    tokio::select! {
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                info!("Telegram channel shutdown during startup retry");
                                return Ok(false);
                            }
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Run until the dispatcher stops or `shutdown_rx` signals `true`.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        if self.config.token.trim().is_empty() {
            return Err(BotError::Config("Telegram bot token is empty".into()));
        }

        let bot = Self::build_bot(&self.config.token)?;
        if !self.wait_until_reachable(&bot, &mut shutdown_rx).await? {
            return Ok(());
        }

        if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
            warn!("Failed to register bot commands: {}", e);
        }

        let state = Arc::new(ChannelState {
            config: self.config.clone(),
            handler: Arc::clone(&self.handler),
        });

        let handler = Update::filter_message()
            .branch(
                dptree::entry()
                    .filter_command::<Command>()
                    .endpoint(handle_command),
            )
            .branch(dptree::endpoint(handle_text));

        let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
            .dependencies(dptree::deps![state])
            .default_handler(|upd| async move {
                debug!("Unhandled update: {:?}", upd.kind);
            })
            .error_handler(LoggingErrorHandler::with_custom_text(
                "Error in Telegram message handler",
            ))
            .build();

        spawn_shutdown_watcher(dispatcher.shutdown_token(), shutdown_rx.clone());

        let transport = self.transport.clone();
        let task_result = std::panic::AssertUnwindSafe(async move {
            match transport {
                TransportConfig::Polling => {
                    info!("Telegram dispatcher started with long polling");
                    dispatcher.dispatch().await;
                    Ok::<(), BotError>(())
                }
                TransportConfig::Webhook {
                    url,
                    listen_host,
                    listen_port,
                } => {
                    let addr: SocketAddr = format!("{}:{}", listen_host, listen_port)
                        .parse()
                        .map_err(|e| {
                            BotError::Config(format!(
                                "Invalid webhook listen address {}:{}: {}",
                                listen_host, listen_port, e
                            ))
                        })?;
                    let public_url: reqwest::Url = url.parse().map_err(|e| {
                        BotError::Config(format!("Invalid webhook url '{}': {}", url, e))
                    })?;
                    let listener = webhooks::axum(bot, webhooks::Options::new(addr, public_url))
                        .await
                        .map_err(|e| {
                            BotError::Channel(format!("Failed to set Telegram webhook: {}", e))
                        })?;
                    info!(addr = %addr, url = %url, "Telegram dispatcher started with webhook");
                    dispatcher
                        .dispatch_with_listener(
                            listener,
                            LoggingErrorHandler::with_custom_text("Webhook listener error"),
                        )
                        .await;
                    Ok(())
                }
            }
        })
        .catch_unwind()
        .await;

        let result = match task_result {
            Ok(result) => result,
            Err(_) => {
                error!("Telegram dispatcher task panicked");
                Err(BotError::Channel("Telegram dispatcher panicked".into()))
            }
        };
        let status = if result.is_ok() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Down
        };
        self.health
            .update(HEALTH_CHECK, status, Some("dispatcher stopped".into()));
        info!("Telegram dispatcher stopped");
        result
    }
}

/// Stop the dispatcher once `shutdown_rx` flips to `true`.
fn spawn_shutdown_watcher(
    token: teloxide::dispatching::ShutdownToken,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                return;
            }
        }
        info!("Telegram channel shutdown signal received");
        // The token refuses to shut down a dispatcher that has not started yet.
        loop {
            match token.shutdown() {
                Ok(done) => {
                    done.await;
                    return;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
    });
}

/// Rate-limit and allowlist key for the sender of `msg`.
fn sender_id(msg: &Message) -> String {
    sender_key(msg.from.as_ref().map(|u| u.id.0), msg.chat.id.0)
}

/// User id when known. Anonymous posts (channels, anonymous group admins)
/// are keyed per chat so they never share one bucket.
fn sender_key(user_id: Option<u64>, chat_id: i64) -> String {
    match user_id {
        Some(id) => id.to_string(),
        None => format!("chat:{}", chat_id),
    }
}

/// Lowercase command name of `text` without the leading slash or `@bot` suffix.
fn command_name(text: &str) -> Option<String> {
    let word = text.trim_start().split_whitespace().next()?;
    let name = word.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    Some(name.to_lowercase())
}

async fn send_all(bot: &Bot, chat_id: ChatId, texts: Vec<String>) -> HandlerResult {
    for text in texts {
        bot.send_message(chat_id, text).await?;
    }
    Ok(())
}

/// Validate, rate limit, then answer `text` for the sender of `msg`.
async fn ask(bot: &Bot, msg: &Message, text: &str, state: &ChannelState) -> HandlerResult {
    let user_id = sender_id(msg);
    info!(
        user = %user_id,
        chat = msg.chat.id.0,
        text = %preview(text, 50),
        "Telegram question received"
    );

    match state.handler.admit(&user_id, text) {
        Admission::Refused(outcome) => send_all(bot, msg.chat.id, outcome.messages()).await,
        Admission::Admitted { query } => {
            bot.send_message(msg.chat.id, messages::PLEASE_WAIT).await?;
            let outcome = state.handler.answer(&user_id, &query).await;
            send_all(bot, msg.chat.id, outcome.messages()).await
        }
    }
}

fn allowed(msg: &Message, state: &ChannelState) -> bool {
    let user_id = sender_id(msg);
    if state.config.is_allowed(&user_id) {
        return true;
    }
    info!("Telegram: User {} not in allowlist, ignoring message", user_id);
    false
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: Arc<ChannelState>,
) -> HandlerResult {
    if !allowed(&msg, &state) {
        return Ok(());
    }

    match cmd {
        Command::Start => {
            bot.send_message(msg.chat.id, messages::WELCOME).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, messages::HELP).await?;
        }
        Command::Psy(question) => ask(&bot, &msg, &question, &state).await?,
        Command::Api(name) => {
            let reply = state.handler.switch_provider(&name);
            bot.send_message(msg.chat.id, reply).await?;
        }
    }
    Ok(())
}

/// Anything that did not parse as a [`Command`].
async fn handle_text(bot: Bot, msg: Message, state: Arc<ChannelState>) -> HandlerResult {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if !allowed(&msg, &state) {
        return Ok(());
    }

    match command_name(text) {
        // `/psy` with nothing after it
        Some(name) if name == "psy" => ask(&bot, &msg, "", &state).await,
        Some(name) => {
            debug!(command = %name, "Ignoring unknown command");
            Ok(())
        }
        None => ask(&bot, &msg, text, &state).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::BotMetrics;
    use crate::providers::ProviderRegistry;
    use crate::rate_limit::{FixedWindowRateLimiter, RateLimitConfig};
    use crate::utils::split::SplitConfig;
    use crate::validation::ValidationConfig;

    #[test]
    fn test_parse_psy_command() {
        let cmd = Command::parse("/psy Почему я боюсь успеха?", "psybot").unwrap();
        assert_eq!(cmd, Command::Psy("Почему я боюсь успеха?".to_string()));
    }

    #[test]
    fn test_parse_with_bot_mention() {
        let cmd = Command::parse("/api@psybot qwen", "psybot").unwrap();
        assert_eq!(cmd, Command::Api("qwen".to_string()));
        assert_eq!(Command::parse("/start", "psybot").unwrap(), Command::Start);
        assert_eq!(Command::parse("/help", "psybot").unwrap(), Command::Help);
    }

    #[test]
    fn test_parse_unknown_command_fails() {
        assert!(Command::parse("/weather Moscow", "psybot").is_err());
        assert!(Command::parse("hello there", "psybot").is_err());
    }

    #[test]
    fn test_command_name() {
        assert_eq!(command_name("/psy"), Some("psy".to_string()));
        assert_eq!(command_name("  /PSY@psybot"), Some("psy".to_string()));
        assert_eq!(command_name("/weather now"), Some("weather".to_string()));
        assert_eq!(command_name("просто текст"), None);
        assert_eq!(command_name(""), None);
    }

    #[test]
    fn test_sender_key_uses_user_id() {
        assert_eq!(sender_key(Some(42), -100123), "42");
    }

    #[test]
    fn test_anonymous_senders_keyed_per_chat() {
        let a = sender_key(None, -1001);
        let b = sender_key(None, -1002);
        assert_eq!(a, "chat:-1001");
        assert_ne!(a, b);

        let limiter = FixedWindowRateLimiter::new(RateLimitConfig::default());
        for _ in 0..RateLimitConfig::default().max_requests {
            assert!(!limiter.check_and_consume(&a));
        }
        assert!(limiter.check_and_consume(&a));
        assert!(!limiter.check_and_consume(&b));
    }

    #[test]
    fn test_bot_commands_listed() {
        let listed: Vec<String> = Command::bot_commands()
            .into_iter()
            .map(|c| c.command)
            .collect();
        assert_eq!(listed.len(), 4);
        assert!(listed.iter().any(|c| c.ends_with("psy")));
        assert!(listed.iter().any(|c| c.ends_with("api")));
    }

    #[tokio::test]
    async fn test_empty_token_is_config_error() {
        let health = HealthRegistry::new();
        let handler = Arc::new(QueryHandler::new(
            ValidationConfig::default(),
            SplitConfig::default(),
            Arc::new(FixedWindowRateLimiter::new(RateLimitConfig::default())),
            Arc::new(ProviderRegistry::new("openrouter")),
            Arc::new(BotMetrics::new()),
        ));
        let channel = TelegramChannel::new(
            TelegramConfig::default(),
            TransportConfig::Polling,
            handler,
            health.clone(),
        );
        assert_eq!(health.status(HEALTH_CHECK), Some(HealthStatus::Degraded));

        let (_tx, rx) = watch::channel(false);
        let err = channel.run(rx).await.unwrap_err();
        assert!(matches!(err, BotError::Config(_)));
    }

    // -----------------------------------------------------------------------
    // Startup retry backoff
    // -----------------------------------------------------------------------

    #[test]
    fn test_startup_backoff_delay_increases() {
        let d0 = TelegramChannel::startup_backoff_delay(0);
        let d1 = TelegramChannel::startup_backoff_delay(1);
        let d2 = TelegramChannel::startup_backoff_delay(2);
        assert_eq!(d0, Duration::from_secs(2));
        assert_eq!(d1, Duration::from_secs(4));
        assert_eq!(d2, Duration::from_secs(8));
    }

    #[test]
    fn test_startup_backoff_delay_caps_at_max() {
        let d_high = TelegramChannel::startup_backoff_delay(20);
        assert_eq!(d_high, Duration::from_secs(MAX_RETRY_DELAY_SECS));
    }

    #[test]
    fn test_startup_backoff_delay_no_overflow() {
        let d = TelegramChannel::startup_backoff_delay(u32::MAX);
        assert_eq!(d, Duration::from_secs(MAX_RETRY_DELAY_SECS));
    }
}

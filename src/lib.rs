//! PsyBot - Telegram bot that relays questions to an LLM for psychological analysis
//!
//! The query pipeline ([`bot::QueryHandler`]) validates input, applies a
//! per-user fixed-window rate limit, asks the active completion provider and
//! splits the reply into Telegram-sized chunks. [`channels::TelegramChannel`]
//! feeds it from Telegram; the `psybot ask` command feeds it from the shell.

pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod health;
pub mod providers;
pub mod rate_limit;
pub mod utils;
pub mod validation;

pub use bot::{Admission, Outcome, QueryHandler};
pub use config::Config;
pub use error::{BotError, ErrorCategory, ProviderError, Result};
pub use providers::{ChatMessage, ChatOptions, Completion, CompletionProvider, ProviderRegistry};
pub use rate_limit::{FixedWindowRateLimiter, RateLimitConfig};
pub use utils::split::split_message;
pub use validation::{validate, RejectReason, ValidationConfig, ValidationResult};

//! Channels module - where user messages come from.
//!
//! Telegram is the only channel. It owns transport concerns (polling or
//! webhook, commands, allowlist) and hands question text to the shared
//! [`QueryHandler`](crate::bot::QueryHandler).

pub mod telegram;

pub use telegram::{Command, TelegramChannel};

//! Telegram Bot API access shared by the storage channel and the chat bot.

mod client;
pub mod types;

pub use client::{BotApi, BotApiError, MediaKind};

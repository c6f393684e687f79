//! Chat front end: Telegram messages in, file service calls, replies out.

pub mod commands;
mod dispatcher;

pub use commands::Command;
pub use dispatcher::{Dispatcher, IncomingMedia, Reply, BOT_DOWNLOAD_LIMIT};

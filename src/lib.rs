//! channel-drive - File storage on top of a Telegram channel
//!
//! Uploaded files are posted to a dedicated channel that acts as an
//! append-only blob store; a local SQLite index maps each channel message id
//! to the file's name, type and size so files can be listed and sent again.
//! - Name-based classification into photo, video and document uploads
//! - Swappable channel backends (Telegram, local filesystem)
//! - Chat bot commands (`/files`, `download <id>`) and a MiniApp upload API

pub mod api;
pub mod bot;
pub mod channel;
pub mod classifier;
pub mod config;
pub mod service;
pub mod storage;
pub mod telegram;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use service::FileService;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub service: Arc<FileService>,
}

mod local;
mod telegram;

pub use local::LocalChannel;
pub use telegram::TelegramChannel;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

use crate::storage::{FileType, MessageId};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Storage channel unavailable: {0}")]
    Unavailable(String),
    #[error("Storage channel rejected the file: {0}")]
    Rejected(String),
    #[error("Message {0} not found in storage channel")]
    NotFound(MessageId),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The chat a stored file is redelivered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination(String);

impl Destination {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self(chat_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for Destination {
    fn from(chat_id: i64) -> Self {
        Self(chat_id.to_string())
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable storage with redelivery, backed by an append-only channel.
///
/// The channel, not the caller, names every stored message: `store` is the
/// only source of [`MessageId`]s that end up in the index.
#[async_trait]
pub trait BlobChannel: Send + Sync {
    /// Post `payload` as a new message shaped for `file_type`. Video and
    /// document messages carry `file_name` as their caption; photos don't.
    async fn store(
        &self,
        payload: Bytes,
        file_name: &str,
        file_type: FileType,
    ) -> Result<MessageId, ChannelError>;

    /// Re-expose a stored message to `destination` without sending its bytes
    /// through this process.
    async fn redeliver(
        &self,
        message_id: MessageId,
        destination: &Destination,
    ) -> Result<(), ChannelError>;
}

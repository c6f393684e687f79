use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use super::{BlobChannel, ChannelError, Destination};
use crate::storage::{FileType, MessageId};
use crate::telegram::{BotApi, BotApiError, MediaKind};

/// Telegram channel used as the file store. Each file is one channel post.
pub struct TelegramChannel {
    api: Arc<BotApi>,
    channel_id: String,
}

impl TelegramChannel {
    pub fn new(api: Arc<BotApi>, channel_id: &str) -> Self {
        Self {
            api,
            channel_id: channel_id.to_string(),
        }
    }

    async fn send(
        &self,
        kind: MediaKind,
        payload: Bytes,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<MessageId, ChannelError> {
        let message = self
            .api
            .send_media(kind, &self.channel_id, payload, file_name, caption)
            .await
            .map_err(store_error)?;
        Ok(MessageId::new(message.message_id))
    }
}

#[async_trait]
impl BlobChannel for TelegramChannel {
    async fn store(
        &self,
        payload: Bytes,
        file_name: &str,
        file_type: FileType,
    ) -> Result<MessageId, ChannelError> {
        match file_type {
            FileType::Photo => self.send(MediaKind::Photo, payload, file_name, None).await,
            FileType::Video => {
                self.send(MediaKind::Video, payload, file_name, Some(file_name))
                    .await
            }
            FileType::Document => {
                self.send(MediaKind::Document, payload, file_name, Some(file_name))
                    .await
            }
        }
    }

    async fn redeliver(
        &self,
        message_id: MessageId,
        destination: &Destination,
    ) -> Result<(), ChannelError> {
        self.api
            .copy_message(destination.as_str(), &self.channel_id, message_id.get())
            .await
            .map_err(|e| redeliver_error(e, message_id))?;
        Ok(())
    }
}

fn store_error(e: BotApiError) -> ChannelError {
    if e.is_unavailable() {
        ChannelError::Unavailable(e.to_string())
    } else {
        ChannelError::Rejected(e.to_string())
    }
}

fn redeliver_error(e: BotApiError, message_id: MessageId) -> ChannelError {
    if e.is_unavailable() {
        return ChannelError::Unavailable(e.to_string());
    }
    match &e {
        BotApiError::Api { description, .. } if is_missing_message(description) => {
            ChannelError::NotFound(message_id)
        }
        _ => ChannelError::Rejected(e.to_string()),
    }
}

/// Bot API wording for a copy source that no longer exists.
fn is_missing_message(description: &str) -> bool {
    let description = description.to_ascii_lowercase();
    description.contains("message to copy not found")
        || description.contains("message not found")
        || description.contains("message_id_invalid")
}

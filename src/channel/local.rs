use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{BlobChannel, ChannelError, Destination};
use crate::storage::{FileType, MessageId};

/// File holding the highest id ever handed out.
const LAST_ID_FILE: &str = "last_id";

/// Local filesystem channel for development and testing.
///
/// Messages live under `messages/<id>`; redelivery copies one into
/// `deliveries/<destination>/<id>`. Ids are never reused, even after the
/// newest message is deleted: the highest id issued is persisted in
/// `last_id` before the message itself is written.
pub struct LocalChannel {
    base_path: PathBuf,
    last_id: Mutex<i64>,
}

impl LocalChannel {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        let messages = base_path.join("messages");
        std::fs::create_dir_all(&messages)?;
        std::fs::create_dir_all(base_path.join("deliveries"))?;

        let mut last_id = read_last_id(&base_path.join(LAST_ID_FILE))?;
        // Messages written by a version without the marker still count
        for entry in std::fs::read_dir(&messages)? {
            let entry = entry?;
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<i64>().ok())
            {
                last_id = last_id.max(id);
            }
        }

        Ok(Self {
            base_path,
            last_id: Mutex::new(last_id),
        })
    }

    /// Reserve the next id and persist it as the new high-water mark.
    async fn next_message_id(&self) -> Result<MessageId, ChannelError> {
        let mut last_id = self.last_id.lock().await;
        let id = *last_id + 1;

        let marker = self.base_path.join(LAST_ID_FILE);
        let staging = self.base_path.join(format!("{LAST_ID_FILE}.tmp"));
        tokio::fs::write(&staging, id.to_string()).await?;
        tokio::fs::rename(&staging, &marker).await?;

        *last_id = id;
        Ok(MessageId::new(id))
    }

    fn message_path(&self, message_id: MessageId) -> PathBuf {
        self.base_path
            .join("messages")
            .join(message_id.get().to_string())
    }

    /// Where `redeliver` puts a copy of `message_id` for `destination`.
    pub fn delivery_path(&self, destination: &Destination, message_id: MessageId) -> PathBuf {
        self.base_path
            .join("deliveries")
            .join(destination.as_str())
            .join(message_id.get().to_string())
    }
}

#[async_trait]
impl BlobChannel for LocalChannel {
    async fn store(
        &self,
        payload: Bytes,
        file_name: &str,
        file_type: FileType,
    ) -> Result<MessageId, ChannelError> {
        let message_id = self.next_message_id().await?;

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.message_path(message_id))
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ChannelError::Unavailable(format!(
                    "message {message_id} already exists in the local channel"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&payload).await?;
        file.sync_all().await?;

        tracing::debug!(
            message_id = %message_id,
            file_name,
            file_type = %file_type,
            "Stored message in local channel"
        );
        Ok(message_id)
    }

    async fn redeliver(
        &self,
        message_id: MessageId,
        destination: &Destination,
    ) -> Result<(), ChannelError> {
        if !is_safe_destination(destination.as_str()) {
            return Err(ChannelError::Rejected(format!(
                "invalid destination '{destination}'"
            )));
        }

        let source = self.message_path(message_id);
        if !source.exists() {
            return Err(ChannelError::NotFound(message_id));
        }

        let target = self.delivery_path(destination, message_id);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&source, &target).await?;
        Ok(())
    }
}

fn read_last_id(path: &Path) -> Result<i64, std::io::Error> {
    match std::fs::read_to_string(path) {
        Ok(text) => text.trim().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("corrupt {}: {e}", path.display()),
            )
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

/// Destinations become directory names: chat ids and `@usernames` only.
fn is_safe_destination(destination: &str) -> bool {
    !destination.is_empty()
        && destination
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '@'))
}

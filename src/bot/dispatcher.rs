use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::commands::{self, Command};
use crate::channel::Destination;
use crate::service::{ContentKind, FileService, Upload};
use crate::telegram::types::{InlineKeyboardMarkup, Message};
use crate::telegram::{BotApi, BotApiError};

/// Pause after a failed `getUpdates` before polling again.
const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Largest file the Bot API serves through `getFile`.
pub const BOT_DOWNLOAD_LIMIT: u64 = 20 * 1024 * 1024;

/// Routes chat messages to the file service and answers in the same chat.
#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<BotApi>,
    service: Arc<FileService>,
    max_upload_size: u64,
    miniapp_url: Option<String>,
    poll_timeout: Duration,
}

/// Text sent back to the user, with an optional button row.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub markup: Option<InlineKeyboardMarkup>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: None,
        }
    }
}

/// A file attached to an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMedia {
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub kind: ContentKind,
}

impl IncomingMedia {
    /// Documents win over videos, videos over photos; a photo is taken at its
    /// largest size.
    pub fn from_message(message: &Message) -> Option<Self> {
        if let Some(doc) = &message.document {
            return Some(Self {
                file_id: doc.file_id.clone(),
                file_name: doc.file_name.clone(),
                file_size: doc.file_size,
                kind: ContentKind::Document,
            });
        }
        if let Some(video) = &message.video {
            return Some(Self {
                file_id: video.file_id.clone(),
                file_name: video.file_name.clone(),
                file_size: video.file_size,
                kind: ContentKind::Video,
            });
        }
        message
            .photo
            .as_ref()
            .and_then(|sizes| sizes.last())
            .map(|photo| Self {
                file_id: photo.file_id.clone(),
                file_name: None,
                file_size: photo.file_size,
                kind: ContentKind::Photo,
            })
    }
}

impl Dispatcher {
    pub fn new(
        api: Arc<BotApi>,
        service: Arc<FileService>,
        max_upload_size: u64,
        miniapp_url: Option<String>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            api,
            service,
            max_upload_size,
            miniapp_url,
            poll_timeout,
        }
    }

    /// Run the polling loop on a background task.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        tracing::info!("Bot dispatcher polling for updates");
        let mut offset = 0;

        loop {
            let updates = match self.api.get_updates(offset, self.poll_timeout).await {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to poll for updates");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else {
                    continue;
                };
                // Each message is its own unit of work; slow uploads don't
                // hold up commands from other chats.
                let this = self.clone();
                tokio::spawn(async move { this.handle_message(message).await });
            }
        }
    }

    async fn handle_message(&self, message: Message) {
        let chat = Destination::from(message.chat.id);

        let reply = if let Some(text) = message.text.as_deref() {
            match Command::parse(text) {
                Some(command) => self.handle_command(command, &chat).await,
                None => return,
            }
        } else if let Some(media) = IncomingMedia::from_message(&message) {
            Some(Reply::text(self.handle_upload(media).await))
        } else {
            None
        };

        let Some(reply) = reply else {
            return;
        };
        if let Err(e) = self
            .api
            .send_message(
                chat.as_str(),
                &reply.text,
                Some(message.message_id),
                reply.markup.as_ref(),
            )
            .await
        {
            tracing::warn!(chat_id = %chat, error = %e, "Failed to send reply");
        }
    }

    /// `None` means the command's effect is its own answer (a redelivered file).
    pub async fn handle_command(&self, command: Command, chat: &Destination) -> Option<Reply> {
        match command {
            Command::Start => Some(Reply {
                text: commands::GREETING.to_string(),
                markup: self.miniapp_button(),
            }),
            Command::Ui => Some(match self.miniapp_button() {
                Some(markup) => Reply {
                    text: "Opening the MiniApp:".to_string(),
                    markup: Some(markup),
                },
                None => Reply::text("The MiniApp is not configured."),
            }),
            Command::Files => Some(Reply::text(match self.service.list() {
                Ok(files) => commands::render_file_list(&files),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to list files");
                    format!("Could not list files: {e}")
                }
            })),
            Command::Download(id) => match self.service.retrieve(&id, chat).await {
                Ok(_) => None,
                Err(e) => Some(Reply::text(commands::render_retrieve_error(&e))),
            },
        }
    }

    /// Fetch an attachment from Telegram and upload it; returns the reply.
    pub async fn handle_upload(&self, media: IncomingMedia) -> String {
        if let Some(size) = media.file_size {
            if size > self.max_upload_size {
                return format!(
                    "Upload failed: file is {size} bytes, the limit is {} bytes",
                    self.max_upload_size
                );
            }
            if size > BOT_DOWNLOAD_LIMIT {
                return format!(
                    "Upload failed: file is {size} bytes, but bots can only fetch files up to 20 MB. Use the MiniApp for larger files."
                );
            }
        }

        let payload = match self.fetch(&media.file_id).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(file_id = %media.file_id, error = %e, "Failed to fetch upload");
                return format!("Upload failed: could not fetch the file from Telegram: {e}");
            }
        };
        if payload.len() as u64 > self.max_upload_size {
            return format!(
                "Upload failed: file exceeds the limit of {} bytes",
                self.max_upload_size
            );
        }

        let result = self
            .service
            .upload(Upload::new(payload, media.file_name, media.kind))
            .await;
        commands::render_upload(&result)
    }

    async fn fetch(&self, file_id: &str) -> Result<Bytes, BotApiError> {
        let file = self.api.get_file(file_id).await?;
        let path = file.file_path.ok_or_else(|| BotApiError::Api {
            code: 400,
            description: "file is not available for download".to_string(),
        })?;
        self.api.download_file(&path).await
    }

    fn miniapp_button(&self) -> Option<InlineKeyboardMarkup> {
        self.miniapp_url
            .as_deref()
            .map(|url| InlineKeyboardMarkup::web_app("Open MiniApp", url))
    }
}

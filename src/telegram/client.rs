use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use super::types::*;

/// Extra time on top of the long-poll timeout before the HTTP request gives up.
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum BotApiError {
    #[error("Transport error: {0}")]
    Transport(reqwest::Error),
    #[error("Telegram API error ({code}): {description}")]
    Api { code: u16, description: String },
}

impl BotApiError {
    /// Whether the failure says nothing about the request itself: the Bot API
    /// could not be reached, was overloaded, or failed internally.
    pub fn is_unavailable(&self) -> bool {
        match self {
            BotApiError::Transport(_) => true,
            BotApiError::Api { code, .. } => {
                *code == StatusCode::TOO_MANY_REQUESTS.as_u16() || *code >= 500
            }
        }
    }
}

// The token is part of every URL; strip URLs before errors reach logs.
impl From<reqwest::Error> for BotApiError {
    fn from(e: reqwest::Error) -> Self {
        BotApiError::Transport(e.without_url())
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_parameters: Option<ReplyParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Serialize)]
struct ReplyParameters {
    message_id: i64,
    allow_sending_without_reply: bool,
}

/// How a file is posted to a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Document,
    Photo,
    Video,
}

impl MediaKind {
    fn method(self) -> &'static str {
        match self {
            MediaKind::Document => "sendDocument",
            MediaKind::Photo => "sendPhoto",
            MediaKind::Video => "sendVideo",
        }
    }

    fn field(self) -> &'static str {
        match self {
            MediaKind::Document => "document",
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }
}

/// Minimal Telegram Bot API client.
pub struct BotApi {
    base_url: String,
    client: Client,
    request_timeout: Duration,
    token: String,
}

impl BotApi {
    pub fn new(
        base_url: &str,
        token: &str,
        request_timeout: Duration,
    ) -> Result<Self, BotApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            request_timeout,
            token: token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.base_url, self.token, file_path)
    }

    // ========================================================================
    // Chat operations
    // ========================================================================

    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        reply_to: Option<i64>,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, BotApiError> {
        let body = SendMessage {
            chat_id,
            text,
            reply_parameters: reply_to.map(|message_id| ReplyParameters {
                message_id,
                allow_sending_without_reply: true,
            }),
            reply_markup,
        };
        self.call("sendMessage", &body, self.request_timeout).await
    }

    /// Upload `payload` to `chat_id` as a new message.
    pub async fn send_media(
        &self,
        kind: MediaKind,
        chat_id: &str,
        payload: Bytes,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<Message, BotApiError> {
        let mime = mime_guess::from_path(file_name).first_or_octet_stream();
        let length = payload.len() as u64;
        let part = Part::stream_with_length(payload, length)
            .file_name(file_name.to_string())
            .mime_str(mime.essence_str())?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part(kind.field(), part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }

        let resp = self
            .client
            .post(self.method_url(kind.method()))
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Copy an existing message into another chat without re-uploading it.
    pub async fn copy_message(
        &self,
        chat_id: &str,
        from_chat_id: &str,
        message_id: i64,
    ) -> Result<MessageRef, BotApiError> {
        let body = json!({
            "chat_id": chat_id,
            "from_chat_id": from_chat_id,
            "message_id": message_id,
        });
        self.call("copyMessage", &body, self.request_timeout).await
    }

    // ========================================================================
    // Updates and file download
    // ========================================================================

    /// Long-poll for new messages starting at `offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        poll_timeout: Duration,
    ) -> Result<Vec<Update>, BotApiError> {
        let body = json!({
            "offset": offset,
            "timeout": poll_timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        self.call("getUpdates", &body, poll_timeout + POLL_GRACE)
            .await
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File, BotApiError> {
        self.call("getFile", &json!({ "file_id": file_id }), self.request_timeout)
            .await
    }

    /// Fetch the bytes behind a `file_path` returned by `get_file`.
    pub async fn download_file(&self, file_path: &str) -> Result<Bytes, BotApiError> {
        let resp = self
            .client
            .get(self.file_url(file_path))
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let description = resp.text().await.unwrap_or_default();
            return Err(BotApiError::Api {
                code: status.as_u16(),
                description,
            });
        }
        Ok(resp.bytes().await?)
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<T, BotApiError> {
        let resp = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        parse_response(resp).await
    }
}

/// Unwrap the `{ok, result}` envelope; error bodies carry their own code.
async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, BotApiError> {
    let status = resp.status();
    let text = resp.text().await?;

    match serde_json::from_str::<ApiResponse<T>>(&text) {
        Ok(ApiResponse {
            ok: true,
            result: Some(result),
            ..
        }) => Ok(result),
        Ok(envelope) => Err(BotApiError::Api {
            code: envelope.error_code.unwrap_or_else(|| status.as_u16()),
            description: envelope
                .description
                .unwrap_or_else(|| "request was not successful".to_string()),
        }),
        Err(e) => Err(BotApiError::Api {
            code: status.as_u16(),
            description: if status.is_success() {
                format!("unexpected response body: {e}")
            } else {
                text
            },
        }),
    }
}

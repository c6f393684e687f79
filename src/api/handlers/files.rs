use axum::extract::{Multipart, Path, State};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::channel::Destination;
use crate::service::{ContentKind, Upload};
use crate::storage::{FileRecord, FileSummary, FileType, MessageId};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct FileResponse {
    pub id: MessageId,
    pub file_name: String,
    pub file_type: FileType,
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileListItem {
    pub id: MessageId,
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeliverRequest {
    pub chat_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeliverResponse {
    pub id: MessageId,
    pub chat_id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Multipart upload from the MiniApp: a `file` part and an optional `kind`.
pub async fn create_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let mut payload: Option<Bytes> = None;
    let mut declared_name: Option<String> = None;
    let mut kind = ContentKind::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                declared_name = field.file_name().map(|s| s.to_string());

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

                if data.len() as u64 > state.config.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.max_upload_size
                    )));
                }
                payload = Some(data);
            }
            "kind" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid kind: {e}")))?;
                kind = ContentKind::parse(&text).ok_or_else(|| {
                    ApiError::bad_request("kind must be one of photo, video, document")
                })?;
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let payload = payload.ok_or_else(|| ApiError::bad_request("file field is required"))?;

    // A stored-but-unindexed upload surfaces as a 500 naming the message id.
    let file = state
        .service
        .upload(Upload::new(payload, declared_name, kind))
        .await?
        .into_result()?;

    Ok(JSend::success(file_to_response(&file)))
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<Vec<FileListItem>>>, ApiError> {
    let files = state.service.list()?;
    Ok(JSend::success(files.into_iter().map(summary_to_item).collect()))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = state.service.lookup(&id)?;
    Ok(JSend::success(file_to_response(&file)))
}

/// Redeliver a stored file into a chat.
pub async fn deliver_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<DeliverRequest>,
) -> Result<Json<JSend<DeliverResponse>>, ApiError> {
    let chat_id = req.chat_id.trim();
    if chat_id.is_empty() {
        return Err(ApiError::bad_request("chat_id must not be empty"));
    }

    let destination = Destination::new(chat_id);
    let file = state.service.retrieve(&id, &destination).await?;

    Ok(JSend::success(DeliverResponse {
        id: file.message_id,
        chat_id: destination.to_string(),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn file_to_response(file: &FileRecord) -> FileResponse {
    FileResponse {
        id: file.message_id,
        file_name: file.file_name.clone(),
        file_type: file.file_type,
        size: file.size,
    }
}

fn summary_to_item(file: FileSummary) -> FileListItem {
    FileListItem {
        id: file.message_id,
        file_name: file.file_name,
    }
}

//! Upload and retrieval orchestration over the index and the storage channel.
//!
//! An upload is two separately durable steps: the channel stores the bytes
//! (phase 1), then the index records the message id it handed back
//! (phase 2). Nothing rolls phase 1 back; a phase 2 failure is reported as
//! [`UploadOutcome::StoredButUnindexed`] so the message id is never lost.

use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::channel::{BlobChannel, ChannelError, Destination};
use crate::classifier::classify;
use crate::storage::models::InvalidMessageId;
use crate::storage::{FileRecord, FileSummary, IndexError, IndexStore, MessageId};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("{0}")]
    BackendUnavailable(String),
    #[error("{0}")]
    PayloadRejected(String),
    #[error("File was stored as message {message_id} but could not be indexed: {source}")]
    IndexWriteFailed {
        message_id: MessageId,
        source: IndexError,
    },
    #[error("File not found (id={0})")]
    NotFound(MessageId),
    #[error("File id={0} is indexed but missing from the storage channel")]
    OrphanedIndexEntry(MessageId),
    #[error("Invalid file id: {0}")]
    InvalidIdentifier(String),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

impl From<InvalidMessageId> for FileError {
    fn from(e: InvalidMessageId) -> Self {
        FileError::InvalidIdentifier(e.0)
    }
}

/// What kind of upload path a payload arrived on.
///
/// Only used to name files that arrive without one; classification always
/// goes by the (declared or synthesized) name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    #[default]
    Document,
    Photo,
    Video,
}

impl ContentKind {
    pub fn default_file_name(self) -> &'static str {
        match self {
            ContentKind::Document => "file.bin",
            ContentKind::Photo => "photo.jpg",
            ContentKind::Video => "video.mp4",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Some(ContentKind::Document),
            "photo" => Some(ContentKind::Photo),
            "video" => Some(ContentKind::Video),
            _ => None,
        }
    }
}

/// A payload handed over by a client, not yet classified.
#[derive(Debug, Clone)]
pub struct Upload {
    pub payload: Bytes,
    pub declared_name: Option<String>,
    pub kind: ContentKind,
}

impl Upload {
    pub fn new(payload: Bytes, declared_name: Option<String>, kind: ContentKind) -> Self {
        Self {
            payload,
            declared_name,
            kind,
        }
    }

    /// The declared name, or the path's default when none was given.
    pub fn file_name(&self) -> String {
        self.declared_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.kind.default_file_name())
            .to_string()
    }
}

/// Result of an upload whose bytes reached the channel.
#[derive(Debug)]
pub enum UploadOutcome {
    /// Stored in the channel and recorded in the index.
    FullyStored(FileRecord),
    /// Stored in the channel, but the index write failed. The bytes are
    /// safe; the record needs to be added by hand.
    StoredButUnindexed {
        record: FileRecord,
        error: IndexError,
    },
}

impl UploadOutcome {
    pub fn record(&self) -> &FileRecord {
        match self {
            UploadOutcome::FullyStored(record) => record,
            UploadOutcome::StoredButUnindexed { record, .. } => record,
        }
    }

    /// Collapse into a `Result`, turning a missed index write into
    /// [`FileError::IndexWriteFailed`].
    pub fn into_result(self) -> Result<FileRecord, FileError> {
        match self {
            UploadOutcome::FullyStored(record) => Ok(record),
            UploadOutcome::StoredButUnindexed { record, error } => {
                Err(FileError::IndexWriteFailed {
                    message_id: record.message_id,
                    source: error,
                })
            }
        }
    }
}

/// Owns the index and the channel; request handlers share it through an `Arc`.
pub struct FileService {
    channel: Arc<dyn BlobChannel>,
    index: IndexStore,
    backend_timeout: Duration,
}

impl FileService {
    pub fn new(index: IndexStore, channel: Arc<dyn BlobChannel>, backend_timeout: Duration) -> Self {
        Self {
            channel,
            index,
            backend_timeout,
        }
    }

    /// Classify, store in the channel, then record in the index.
    ///
    /// Exactly one channel store per call and no retries: a repeated upload
    /// becomes a second message with its own id.
    pub async fn upload(&self, upload: Upload) -> Result<UploadOutcome, FileError> {
        let file_name = upload.file_name();
        let file_type = classify(&file_name);
        let size = upload.payload.len() as u64;

        tracing::debug!(file_name = %file_name, file_type = %file_type, size, "Classified upload");

        let message_id = self
            .with_timeout(self.channel.store(upload.payload, &file_name, file_type))
            .await
            .map_err(|e| {
                tracing::warn!(file_name = %file_name, error = %e, "Channel store failed");
                store_error(e)
            })?;

        match self.index.record(message_id, &file_name, file_type, size) {
            Ok(record) => {
                tracing::info!(message_id = %message_id, file_name = %file_name, file_type = %file_type, size, "Stored file");
                Ok(UploadOutcome::FullyStored(record))
            }
            Err(error) => {
                tracing::error!(
                    message_id = %message_id,
                    file_name = %file_name,
                    file_type = %file_type,
                    size,
                    error = %error,
                    "File stored in channel but not indexed"
                );
                Ok(UploadOutcome::StoredButUnindexed {
                    record: FileRecord {
                        message_id,
                        file_name,
                        file_type,
                        size,
                    },
                    error,
                })
            }
        }
    }

    /// Every indexed file, most recent first.
    pub fn list(&self) -> Result<Vec<FileSummary>, FileError> {
        Ok(self.index.list_all()?)
    }

    pub fn lookup(&self, identifier: &str) -> Result<FileRecord, FileError> {
        let message_id: MessageId = identifier.parse()?;
        self.index
            .lookup(message_id)?
            .ok_or(FileError::NotFound(message_id))
    }

    /// Redeliver the file named by `identifier` to `destination`.
    ///
    /// Ids that were never indexed fail with [`FileError::NotFound`] before
    /// the channel is contacted; ids the index knows but the channel lost fail
    /// with [`FileError::OrphanedIndexEntry`].
    pub async fn retrieve(
        &self,
        identifier: &str,
        destination: &Destination,
    ) -> Result<FileRecord, FileError> {
        let record = self.lookup(identifier)?;
        let message_id = record.message_id;

        match self
            .with_timeout(self.channel.redeliver(message_id, destination))
            .await
        {
            Ok(()) => {
                tracing::debug!(message_id = %message_id, destination = %destination, "Redelivered file");
                Ok(record)
            }
            Err(ChannelError::NotFound(_)) => {
                tracing::warn!(message_id = %message_id, "Indexed file is missing from the channel");
                Err(FileError::OrphanedIndexEntry(message_id))
            }
            Err(e) => Err(store_error(e)),
        }
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, ChannelError>>,
    ) -> Result<T, ChannelError> {
        match tokio::time::timeout(self.backend_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Unavailable(format!(
                "no response within {}s",
                self.backend_timeout.as_secs_f64()
            ))),
        }
    }
}

fn store_error(e: ChannelError) -> FileError {
    match e {
        ChannelError::Rejected(_) => FileError::PayloadRejected(e.to_string()),
        ChannelError::Unavailable(_) | ChannelError::Io(_) => {
            FileError::BackendUnavailable(e.to_string())
        }
        // A channel cannot lose a message it has not been handed yet.
        ChannelError::NotFound(id) => FileError::BackendUnavailable(format!(
            "storage channel reported message {id} missing"
        )),
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a stored file: the message id the backing channel assigned
/// to the message carrying it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rejection of a user-supplied identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid file id")]
pub struct InvalidMessageId(pub String);

impl FromStr for MessageId {
    type Err = InvalidMessageId;

    /// Accepts ASCII digits only: no sign, no whitespace, no overflow.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidMessageId(s.to_string()));
        }
        s.parse::<i64>()
            .map(MessageId)
            .map_err(|_| InvalidMessageId(s.to_string()))
    }
}

/// How a file is sent to and shown in the backing channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Document,
    Photo,
    Video,
}

impl FileType {
    /// Column value in the `files` table.
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Document => "document",
            FileType::Photo => "photo",
            FileType::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "document" => Some(FileType::Document),
            "photo" => Some(FileType::Photo),
            "video" => Some(FileType::Video),
            _ => None,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file record stored in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub message_id: MessageId,
    pub file_name: String,
    pub file_type: FileType,
    pub size: u64,
}

/// The `(identifier, name)` pair returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub message_id: MessageId,
    pub file_name: String,
}

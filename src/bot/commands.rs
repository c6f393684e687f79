//! Chat command parsing and reply text.

use crate::service::{FileError, UploadOutcome};
use crate::storage::FileSummary;

pub const GREETING: &str = "Hi!\n\
    - Use the MiniApp to upload and manage files.\n\
    - Files are kept in a channel that works as your cloud storage.";

pub const NO_FILES: &str = "No files yet.";

/// A text message the bot acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Files,
    Ui,
    /// `download <digits>`; the digits are validated by the service.
    Download(String),
}

impl Command {
    /// Recognise a command. Anything else is not for the bot.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();

        if let Some(rest) = text.strip_prefix("download ") {
            return (!rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
                .then(|| Command::Download(rest.to_string()));
        }

        // `/files@my_bot` addresses this bot explicitly in group chats.
        let (command, _args) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let command = command.split_once('@').map_or(command, |(name, _)| name);
        match command {
            "/start" => Some(Command::Start),
            "/files" => Some(Command::Files),
            "/ui" => Some(Command::Ui),
            _ => None,
        }
    }
}

/// One `- {name} (id={id})` line per file, or a notice when there are none.
pub fn render_file_list(files: &[FileSummary]) -> String {
    if files.is_empty() {
        return NO_FILES.to_string();
    }
    files
        .iter()
        .map(|f| format!("- {} (id={})", f.file_name, f.message_id))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_upload(result: &Result<UploadOutcome, FileError>) -> String {
    match result {
        Ok(UploadOutcome::FullyStored(record)) => format!("File '{}' uploaded", record.file_name),
        Ok(UploadOutcome::StoredButUnindexed { record, error }) => format!(
            "File '{}' was stored (id={}) but could not be added to the file list: {error}",
            record.file_name, record.message_id
        ),
        Err(e) => format!("Upload failed: {e}"),
    }
}

/// Reply for a failed download; a successful one needs none.
pub fn render_retrieve_error(error: &FileError) -> String {
    match error {
        FileError::NotFound(_) | FileError::OrphanedIndexEntry(_) | FileError::InvalidIdentifier(_) => {
            error.to_string()
        }
        _ => format!("Download failed: {error}"),
    }
}

//! Name-based routing of uploads into photo, video or document handling.
//!
//! Only the extension is consulted; content is never sniffed. The mapping
//! matches what existing indexes were written with.

use crate::storage::FileType;

const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv"];

/// Classify a file by the lowercase suffix after its last `.`.
pub fn classify(file_name: &str) -> FileType {
    let Some((_, extension)) = file_name.rsplit_once('.') else {
        return FileType::Document;
    };
    let extension = extension.to_ascii_lowercase();

    if PHOTO_EXTENSIONS.contains(&extension.as_str()) {
        FileType::Photo
    } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
        FileType::Video
    } else {
        FileType::Document
    }
}

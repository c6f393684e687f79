pub mod db;
mod files;
pub mod models;
mod schema;

pub use db::{IndexError, IndexStore};
pub use models::{FileRecord, FileSummary, FileType, MessageId};

mod files;
mod health;

pub use files::{create_file, deliver_file, get_file, list_files};
pub use files::{DeliverRequest, DeliverResponse, FileListItem, FileResponse};
pub use health::health;

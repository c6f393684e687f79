use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::models::MessageId;
use super::schema::migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File id {0} is already indexed")]
    DuplicateIdentifier(MessageId),
    #[error("Corrupt index row: {0}")]
    Corrupt(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),
}

/// Local index of stored files, kept in a single SQLite table.
///
/// No connection outlives a call: every operation opens the database file,
/// does its work and drops the handle before returning.
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Open or create the index at `path` and make sure the table exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let store = Self::new(path);
        store.initialize()?;
        Ok(store)
    }

    /// Idempotently bring the `files` table to the latest schema,
    /// upgrading a legacy layout in place.
    pub fn initialize(&self) -> Result<(), IndexError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = self.connect()?;
        migrations().to_latest(&mut conn)?;
        tracing::debug!(path = %self.path.display(), "Index schema up to date");
        Ok(())
    }

    pub(super) fn connect(&self) -> Result<Connection, IndexError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

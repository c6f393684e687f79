use rusqlite::{params, ErrorCode, OptionalExtension, Row};

use super::db::{IndexError, IndexStore};
use super::models::{FileRecord, FileSummary, FileType, MessageId};
use super::schema::*;

impl IndexStore {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Insert a new record. Existing rows are never replaced.
    pub fn record(
        &self,
        message_id: MessageId,
        file_name: &str,
        file_type: FileType,
        size: u64,
    ) -> Result<FileRecord, IndexError> {
        let stored_size = i64::try_from(size)
            .map_err(|_| IndexError::Corrupt(format!("size {size} does not fit the index")))?;

        let conn = self.connect()?;
        match conn.execute(
            INSERT_FILE,
            params![message_id.get(), file_name, file_type.as_str(), stored_size],
        ) {
            Ok(_) => {}
            Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                return Err(IndexError::DuplicateIdentifier(message_id));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(FileRecord {
            message_id,
            file_name: file_name.to_string(),
            file_type,
            size,
        })
    }

    /// Point read by message id.
    pub fn lookup(&self, message_id: MessageId) -> Result<Option<FileRecord>, IndexError> {
        let conn = self.connect()?;
        let row = conn
            .query_row(SELECT_FILE, params![message_id.get()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            })
            .optional()?;

        let Some((id, file_name, file_type, size)) = row else {
            return Ok(None);
        };

        let file_type = file_type.as_deref().and_then(FileType::parse).ok_or_else(|| {
            IndexError::Corrupt(format!("file {id} has unknown type {file_type:?}"))
        })?;
        let size = u64::try_from(size.unwrap_or(0))
            .map_err(|_| IndexError::Corrupt(format!("file {id} has a negative size")))?;

        Ok(Some(FileRecord {
            message_id: MessageId::new(id),
            file_name: file_name.unwrap_or_default(),
            file_type,
            size,
        }))
    }

    /// All indexed files, most recently recorded first.
    pub fn list_all(&self) -> Result<Vec<FileSummary>, IndexError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(LIST_FILES)?;
        let rows = stmt.query_map([], summary_from_row)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<FileSummary> {
    Ok(FileSummary {
        message_id: MessageId::new(row.get(0)?),
        file_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
    })
}

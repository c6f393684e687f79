use rusqlite_migration::{M, Migrations};

/// Schema history, tracked in `PRAGMA user_version`.
///
/// Databases from earlier deployments sit at version 0 with the table from
/// step 1 already present, so only step 2 runs for them.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // 1: file records, channel message id -> name, type and size
        M::up(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                message_id INTEGER PRIMARY KEY,
                file_name TEXT,
                file_type TEXT,
                size INTEGER
            );
            "#,
        ),
        // 2: message_id aliases the rowid, so insertion order gets its own
        // column, back-filled from the rowid for existing rows
        M::up(
            r#"
            ALTER TABLE files ADD COLUMN seq INTEGER NOT NULL DEFAULT 0;
            UPDATE files SET seq = rowid;
            CREATE INDEX idx_files_seq ON files(seq DESC);
            "#,
        ),
    ])
}

pub const INSERT_FILE: &str = "
    INSERT INTO files (message_id, file_name, file_type, size, seq)
    SELECT ?1, ?2, ?3, ?4, COALESCE(MAX(seq), 0) + 1 FROM files
";

pub const SELECT_FILE: &str =
    "SELECT message_id, file_name, file_type, size FROM files WHERE message_id = ?1";

pub const LIST_FILES: &str =
    "SELECT message_id, file_name FROM files ORDER BY seq DESC, rowid DESC";

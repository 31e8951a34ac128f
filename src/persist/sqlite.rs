//! SQLite-backed archive of finished operations.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::{operation::Operation, types::OperationId};

use super::{OperationArchive, PersistError, PersistResult};

/// Version number for serialized [`ArchivedOperation`] payloads.
pub const ARCHIVE_FORMAT_VERSION: u16 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS operations (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    target TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at_ms INTEGER NOT NULL,
    ended_at_ms INTEGER,
    payload BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS operations_started ON operations(started_at_ms);
";

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedOperation {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub operation: Operation,
}

impl ArchivedOperation {
    /// Constructs an envelope using [`ARCHIVE_FORMAT_VERSION`].
    pub fn new(operation: Operation) -> Self {
        Self {
            format_version: ARCHIVE_FORMAT_VERSION,
            operation,
        }
    }
}

/// SQLite implementation of [`crate::persist::OperationArchive`].
pub struct SqliteArchive {
    conn: Connection,
}

impl SqliteArchive {
    /// Opens or creates an archive at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory archive.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Loads one archived operation.
    pub fn load(&self, id: OperationId) -> PersistResult<Option<Operation>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM operations WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        payload.map(|p| decode_payload(&p)).transpose()
    }

    /// Loads every archived operation, oldest first.
    pub fn load_all(&self) -> PersistResult<Vec<Operation>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM operations ORDER BY started_at_ms ASC, rowid ASC")?;

        let rows = stmt.query_map([], |row| {
            let payload: Vec<u8> = row.get(0)?;
            decode_payload(&payload).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    payload.len(),
                    rusqlite::types::Type::Blob,
                    Box::new(std::io::Error::other(err.to_string())),
                )
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Number of archived operations.
    pub fn count(&self) -> PersistResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM operations", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl OperationArchive for SqliteArchive {
    fn archive(&mut self, operation: &Operation) -> PersistResult<()> {
        if !operation.is_terminal() {
            return Err(PersistError::Message(format!(
                "refusing to archive non-terminal operation {}",
                operation.id
            )));
        }
        let payload = serde_json::to_vec(&ArchivedOperation::new(operation.clone()))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO operations(id, kind, target, status, started_at_ms, ended_at_ms, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                operation.id.to_string(),
                operation.kind.as_str(),
                operation.target,
                operation.status.as_str(),
                operation.started_at_ms as i64,
                operation.ended_at_ms.map(|v| v as i64),
                payload,
            ],
        )?;
        Ok(())
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }
}

fn decode_payload(payload: &[u8]) -> PersistResult<Operation> {
    let envelope: ArchivedOperation = serde_json::from_slice(payload)?;
    if envelope.format_version != ARCHIVE_FORMAT_VERSION {
        return Err(PersistError::Message(format!(
            "unsupported archive format version: {}",
            envelope.format_version
        )));
    }
    Ok(envelope.operation)
}

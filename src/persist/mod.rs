pub mod sqlite;

use thiserror::Error;

use crate::operation::Operation;

/// Failures reading or writing the operation archive.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The database rejected a statement.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored payload could not be encoded or decoded.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Anything else, such as a version mismatch or a failed blocking task.
    #[error("{0}")]
    Message(String),
}

/// Result alias for archive operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Destination for operations that reached a terminal state.
pub trait OperationArchive: Send {
    /// Stores a terminal operation, replacing any earlier copy with the same id.
    fn archive(&mut self, operation: &Operation) -> PersistResult<()>;
    /// Pushes buffered writes to durable storage.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
}

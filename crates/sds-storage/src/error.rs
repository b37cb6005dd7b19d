//! Storage layer error types.

use sds_types::{RecordKind, RegistryError};
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Requested backend (SQLCipher) is not compiled in
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Insert transaction rolled back
    #[error("Insert into {kind} failed: {source}")]
    InsertFailed {
        kind: RecordKind,
        source: rusqlite::Error,
    },

    /// State update transaction rolled back
    #[error("Update of {kind} row {index} failed: {source}")]
    UpdateFailed {
        kind: RecordKind,
        index: i64,
        source: rusqlite::Error,
    },

    /// Eviction command rolled back
    #[error("Retention on {kind} failed: {source}")]
    RetentionFailed {
        kind: RecordKind,
        source: rusqlite::Error,
    },

    /// Table is at its row limit and the policy keeps the oldest rows
    #[error("Storage full: {kind} holds {count} rows (limit {max_entries})")]
    StorageFull {
        kind: RecordKind,
        count: u64,
        max_entries: u64,
    },

    /// Retention policy failed validation
    #[error("Invalid retention policy: {0}")]
    InvalidPolicy(String),

    /// Unknown table, field or state name
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::StorageFull {
            kind: RecordKind::Alarm,
            count: 10,
            max_entries: 10,
        };
        assert_eq!(err.to_string(), "Storage full: alarm holds 10 rows (limit 10)");

        let err: StorageError = RegistryError::InvalidTable("gps".to_string()).into();
        assert_eq!(err.to_string(), "Invalid table: gps");
    }
}

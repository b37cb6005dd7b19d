//! SQLite wrapper for the smart data store.
//!
//! Provides:
//! - Store open/close with table setup and optional SQLCipher keying
//! - Transactional insert, state update, bulk delete and raw commands
//! - Lazy cursors over rows, optionally filtered by state
//!
//! A `Store` owns its connection exclusively and is not internally locked.
//! Share it across threads only behind an external mutex.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, warn};

use sds_types::{
    format_timestamp, Alarm, Attribute, Entry, Location, RecordKind, RetentionPolicy, State,
    Telemetry,
};

use crate::cursor::RowCursor;
use crate::error::StorageError;
use crate::tables;

const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// SQLCipher key derivation rounds
const KDF_ITER: u32 = 64_000;

/// Durable, table-per-kind record store
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
    policy: RetentionPolicy,
    encrypted: bool,
}

impl Store {
    /// Open the store at `path`, creating the file and tables if needed.
    ///
    /// With an encryption key the backend must be SQLCipher; a plain SQLite
    /// build fails with [`StorageError::BackendUnavailable`] rather than
    /// falling back to an unencrypted file.
    pub fn open(path: &Path, encryption_key: Option<&SecretString>) -> Result<Self, StorageError> {
        Self::open_with_policy(path, encryption_key, RetentionPolicy::default())
    }

    /// Open the store with an explicit retention policy.
    ///
    /// A file created by this call starts out owner-only and is removed
    /// again if the open fails.
    pub fn open_with_policy(
        path: &Path,
        encryption_key: Option<&SecretString>,
        policy: RetentionPolicy,
    ) -> Result<Self, StorageError> {
        info!("Opening store at {:?}", path);
        policy.validate().map_err(StorageError::InvalidPolicy)?;

        let created = create_private(path)?;
        let opened = Connection::open(path)
            .map_err(StorageError::from)
            .and_then(|conn| Self::init(conn, Some(path.to_path_buf()), encryption_key, policy));

        match opened {
            Ok(store) => {
                restrict_permissions(path)?;
                Ok(store)
            }
            Err(e) => {
                if created {
                    if let Err(remove_err) = std::fs::remove_file(path) {
                        warn!(error = %remove_err, "Failed to remove store file after failed open");
                    }
                }
                Err(e)
            }
        }
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None, None, RetentionPolicy::default())
    }

    fn init(
        conn: Connection,
        path: Option<PathBuf>,
        encryption_key: Option<&SecretString>,
        policy: RetentionPolicy,
    ) -> Result<Self, StorageError> {
        let encrypted = match encryption_key {
            Some(key) => {
                apply_key(&conn, key)?;
                info!("Using SQLCipher backend");
                true
            }
            None => false,
        };

        conn.busy_timeout(BUSY_TIMEOUT)?;
        tables::create_all(&conn)?;

        Ok(Self {
            conn,
            path,
            policy,
            encrypted,
        })
    }

    /// Path of the backing file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the file is keyed with SQLCipher
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Active retention policy
    pub fn retention_policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Validate and swap the retention policy.
    ///
    /// The old policy stays in place if validation fails.
    pub fn set_retention_policy(&mut self, policy: RetentionPolicy) -> Result<(), StorageError> {
        policy.validate().map_err(StorageError::InvalidPolicy)?;
        info!(?policy, "Retention policy updated");
        self.policy = policy;
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside one transaction. Dropping the transaction on error
    /// rolls it back.
    pub(crate) fn transact<T, F>(&mut self, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    {
        let tx = self.conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Insert a row and return its index.
    ///
    /// NaN or infinite numbers and timestamps outside years 0..=9999 are
    /// rejected before anything is touched. Retention runs next. Eviction
    /// failures are logged and the insert still goes ahead; a full table under `KeepOldest` rejects the insert
    /// with [`StorageError::StorageFull`].
    pub fn insert(&mut self, entry: Entry) -> Result<i64, StorageError> {
        let kind = entry.record.kind();
        entry.validate()?;

        match self.apply_retention(kind) {
            Ok(_) => {}
            Err(e @ StorageError::StorageFull { .. }) => {
                error!(kind = %kind, error = %e, "Rejecting insert");
                return Err(e);
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Retention failed, inserting anyway");
            }
        }

        let ts = format_timestamp(&entry.timestamp.unwrap_or_else(Utc::now));
        let state = entry.state.unwrap_or_default();

        let index = self
            .transact(|tx| {
                tables::insert_record(tx, &entry.record, &ts, state)?;
                Ok(tx.last_insert_rowid())
            })
            .map_err(|source| {
                error!(kind = %kind, error = %source, "Insert failed");
                StorageError::InsertFailed { kind, source }
            })?;

        debug!(kind = %kind, index, state = %state, "Inserted row");
        Ok(index)
    }

    pub fn insert_telemetry(
        &mut self,
        name: impl Into<String>,
        value: f64,
    ) -> Result<i64, StorageError> {
        self.insert(Entry::new(Telemetry::new(name, value)))
    }

    pub fn insert_location(&mut self, location: Location) -> Result<i64, StorageError> {
        self.insert(Entry::new(location))
    }

    pub fn insert_alarm(&mut self, alarm: Alarm) -> Result<i64, StorageError> {
        self.insert(Entry::new(alarm))
    }

    pub fn insert_attribute(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<i64, StorageError> {
        self.insert(Entry::new(Attribute::new(name, value)))
    }

    /// Rows of `kind` in `state`, ascending index
    pub fn select_by_state(&self, kind: RecordKind, state: State) -> RowCursor<'_> {
        RowCursor::new(&self.conn, kind, Some(state))
    }

    /// All rows of `kind`, ascending index
    pub fn select_all(&self, kind: RecordKind) -> RowCursor<'_> {
        RowCursor::new(&self.conn, kind, None)
    }

    /// Set the state of one row.
    ///
    /// Updating a row to the state it already has is a no-op success.
    pub fn update_state(
        &mut self,
        kind: RecordKind,
        index: i64,
        state: State,
    ) -> Result<(), StorageError> {
        let sql = tables::sql(kind).update_state;
        let changed = self
            .transact(|tx| tx.execute(sql, params![state.as_str(), index]))
            .map_err(|source| {
                error!(kind = %kind, index, error = %source, "Update failed");
                StorageError::UpdateFailed {
                    kind,
                    index,
                    source,
                }
            })?;

        if changed == 0 {
            debug!(kind = %kind, index, "No row to update");
        } else {
            debug!(kind = %kind, index, state = %state, "Updated row state");
        }
        Ok(())
    }

    /// Number of rows in the table; 0 if empty or if the count fails
    pub fn row_count(&self, kind: RecordKind) -> u64 {
        let sql = tables::sql(kind).count;
        match self.conn.query_row(sql, [], |r| r.get::<_, i64>(0)) {
            Ok(count) => u64::try_from(count).unwrap_or(0),
            Err(e) => {
                error!(kind = %kind, error = %e, "Row count failed");
                0
            }
        }
    }

    /// Row counts per state, in [`State::ALL`] order, omitting empty states
    pub fn count_by_state(&self, kind: RecordKind) -> Result<Vec<(State, u64)>, StorageError> {
        let mut stmt = self.conn.prepare_cached(tables::sql(kind).count_by_state)?;
        let raw = stmt
            .query_map([], |r| Ok((r.get::<_, Option<String>>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = Vec::new();
        for state in State::ALL {
            let count: i64 = raw
                .iter()
                .filter(|(s, _)| s.as_deref() == Some(state.as_str()))
                .map(|(_, c)| *c)
                .sum();
            if count > 0 {
                counts.push((state, count as u64));
            }
        }
        Ok(counts)
    }

    /// Delete every row of `kind` in `state`, returning the number removed
    pub fn delete_by_state(&mut self, kind: RecordKind, state: State) -> Result<usize, StorageError> {
        let sql = tables::sql(kind).delete_by_state;
        let deleted = self.transact(|tx| tx.execute(sql, params![state.as_str()]))?;
        info!(kind = %kind, state = %state, deleted, "Deleted rows by state");
        Ok(deleted)
    }

    /// Delete one row, returning whether it existed
    pub fn delete_row(&mut self, kind: RecordKind, index: i64) -> Result<bool, StorageError> {
        let sql = tables::sql(kind).delete_row;
        let deleted = self.transact(|tx| tx.execute(sql, params![index]))?;
        Ok(deleted > 0)
    }

    /// Execute a maintenance command batch in one transaction.
    ///
    /// Either every statement commits or none does.
    pub fn raw_execute(&mut self, sql: &str) -> Result<(), StorageError> {
        self.transact(|tx| tx.execute_batch(sql)).map_err(|e| {
            error!(error = %e, "Raw command failed");
            StorageError::Sqlite(e)
        })
    }

    /// Per-table statistics
    pub fn stats(&self) -> Result<StoreStats, StorageError> {
        let mut tables = Vec::with_capacity(RecordKind::ALL.len());
        for kind in RecordKind::ALL {
            tables.push(TableStats {
                kind,
                rows: self.row_count(kind),
                by_state: self.count_by_state(kind)?,
            });
        }

        let disk_usage_bytes = match &self.path {
            Some(path) => std::fs::metadata(path)?.len(),
            None => 0,
        };

        Ok(StoreStats {
            tables,
            disk_usage_bytes,
        })
    }

    /// Release the connection.
    ///
    /// Dropping the store also closes it; this variant reports close errors.
    pub fn close(self) -> Result<(), StorageError> {
        info!("Closing store at {:?}", self.path);
        self.conn.close().map_err(|(_, e)| StorageError::Sqlite(e))
    }
}

/// Key the connection, refusing to continue without SQLCipher
fn apply_key(conn: &Connection, key: &SecretString) -> Result<(), StorageError> {
    let cipher: Option<String> = conn
        .query_row("PRAGMA cipher_version", [], |r| r.get(0))
        .optional()?;
    if cipher.is_none() {
        error!("Encryption key supplied but SQLCipher is not available");
        return Err(StorageError::BackendUnavailable(
            "encryption requested but the SQLite build has no SQLCipher support".to_string(),
        ));
    }

    conn.pragma_update(None, "key", key.expose_secret())?;
    conn.pragma_update(None, "kdf_iter", KDF_ITER)?;
    Ok(())
}

/// Create the database file with owner-only permissions if it is missing.
///
/// Returns whether this call created it.
#[cfg(unix)]
fn create_private(path: &Path) -> Result<bool, StorageError> {
    use std::os::unix::fs::OpenOptionsExt;

    let created = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path);
    match created {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> Result<bool, StorageError> {
    match std::fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Limit the database file to owner read/write
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;

    if path.exists() {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

/// Row counts for one table
#[derive(Debug, Clone)]
pub struct TableStats {
    pub kind: RecordKind,
    pub rows: u64,
    /// Non-empty states with their row counts
    pub by_state: Vec<(State, u64)>,
}

/// Statistics about the store.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub tables: Vec<TableStats>,
    /// Size of the database file in bytes
    pub disk_usage_bytes: u64,
}

impl StoreStats {
    /// Stats for one table
    pub fn table(&self, kind: RecordKind) -> Option<&TableStats> {
        self.tables.iter().find(|t| t.kind == kind)
    }
}

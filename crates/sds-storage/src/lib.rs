//! Storage layer for the smart data store.
//!
//! Provides SQLite-backed storage with:
//! - One table per record kind, created on open
//! - Transactional insert, state update and bulk delete
//! - Lazy forward cursors in insertion order
//! - Retention enforced before every insert
//! - Change detection over unsent samples
//! - Optional SQLCipher encryption at rest (`encryption` feature)

pub mod cursor;
pub mod db;
pub mod error;
pub mod retention;
pub mod smoothing;
mod tables;

pub use cursor::RowCursor;
pub use db::{Store, StoreStats, TableStats};
pub use error::StorageError;
pub use retention::RetentionOutcome;
pub use smoothing::{is_insignificant, SmoothOutcome};

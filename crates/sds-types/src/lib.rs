//! # sds-types
//!
//! Shared domain types for the smart data store.
//!
//! - Registry: record kinds, their tables, and the fields change detection may scan
//! - Records: typed payloads per kind, insert requests, persisted rows
//! - State: row lifecycle tags
//! - Retention: bounds on table growth
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use sds_types::{Entry, RecordKind, Telemetry};
//!
//! let entry = Entry::new(Telemetry::new("temperature", 21.5));
//! assert_eq!(entry.record.kind(), RecordKind::Telemetry);
//! ```

pub mod config;
pub mod error;
pub mod record;
pub mod registry;
pub mod retention;
pub mod state;

pub use config::{PolicyKind, PublishSettings, RetentionSettings, Settings};
pub use error::RegistryError;
pub use record::{
    format_timestamp, parse_timestamp, Alarm, Attribute, Entry, Location, Record, Row, Telemetry,
    TIMESTAMP_FORMAT,
};
pub use registry::{Column, Field, RecordKind, SqlType};
pub use retention::{DropMode, RetentionPolicy};
pub use state::State;

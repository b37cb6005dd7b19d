//! Table and field registry.
//!
//! Each record kind maps to exactly one table with a fixed column set.
//! Column order here is the persisted order; the storage layer derives
//! its schema checks from these lists.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

/// Kind of record, one table per kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Numeric telemetry samples
    Telemetry,
    /// Location fixes
    Location,
    /// Alarm state changes
    Alarm,
    /// String attributes
    Attribute,
}

/// SQLite storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Bool,
}

impl SqlType {
    /// Declared type used in `CREATE TABLE`
    pub fn declared(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
            SqlType::Bool => "BOOL",
        }
    }
}

/// A persisted column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
}

const fn col(name: &'static str, sql_type: SqlType) -> Column {
    Column { name, sql_type }
}

/// Primary key column shared by every table
pub const INDEX_COLUMN: &str = "idx";

/// Lifecycle state column shared by every table
pub const STATE_COLUMN: &str = "status";

/// Timestamp column shared by every table
pub const TIMESTAMP_COLUMN: &str = "ts";

const TELEMETRY_COLUMNS: &[Column] = &[
    col("idx", SqlType::Integer),
    col("data_type", SqlType::Text),
    col("name", SqlType::Text),
    col("value", SqlType::Real),
    col("msg", SqlType::Text),
    col("ts", SqlType::Text),
    col("desc", SqlType::Text),
    col("status", SqlType::Text),
];

const LOCATION_COLUMNS: &[Column] = &[
    col("idx", SqlType::Integer),
    col("data_type", SqlType::Text),
    col("name", SqlType::Text),
    col("latitude", SqlType::Real),
    col("longitude", SqlType::Real),
    col("heading", SqlType::Real),
    col("altitude", SqlType::Real),
    col("speed", SqlType::Real),
    col("accuracy", SqlType::Real),
    col("fix_type", SqlType::Text),
    col("msg", SqlType::Text),
    col("ts", SqlType::Text),
    col("status", SqlType::Text),
];

const ALARM_COLUMNS: &[Column] = &[
    col("idx", SqlType::Integer),
    col("data_type", SqlType::Text),
    col("name", SqlType::Text),
    col("alarm_state", SqlType::Integer),
    col("msg", SqlType::Text),
    col("repub", SqlType::Bool),
    col("ts", SqlType::Text),
    col("corr_id", SqlType::Text),
    col("lat", SqlType::Real),
    col("lng", SqlType::Real),
    col("desc", SqlType::Text),
    col("status", SqlType::Text),
];

const ATTRIBUTE_COLUMNS: &[Column] = &[
    col("idx", SqlType::Integer),
    col("data_type", SqlType::Text),
    col("name", SqlType::Text),
    col("value", SqlType::Text),
    col("corr_id", SqlType::Text),
    col("desc", SqlType::Text),
    col("repub", SqlType::Bool),
    col("ts", SqlType::Text),
    col("status", SqlType::Text),
];

impl RecordKind {
    /// All record kinds in table creation order
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Telemetry,
        RecordKind::Location,
        RecordKind::Alarm,
        RecordKind::Attribute,
    ];

    /// Name of the backing table
    pub fn table_name(self) -> &'static str {
        match self {
            RecordKind::Telemetry => "telemetry",
            RecordKind::Location => "location",
            RecordKind::Alarm => "alarm",
            RecordKind::Attribute => "attribute",
        }
    }

    /// Persisted columns, in table order
    pub fn columns(self) -> &'static [Column] {
        match self {
            RecordKind::Telemetry => TELEMETRY_COLUMNS,
            RecordKind::Location => LOCATION_COLUMNS,
            RecordKind::Alarm => ALARM_COLUMNS,
            RecordKind::Attribute => ATTRIBUTE_COLUMNS,
        }
    }

    /// Numeric fields the change-detection filter may scan for this kind
    pub fn smoothable_fields(self) -> &'static [Field] {
        match self {
            RecordKind::Telemetry => &[Field::Value],
            RecordKind::Location => &[
                Field::Latitude,
                Field::Longitude,
                Field::Heading,
                Field::Altitude,
                Field::Speed,
                Field::Accuracy,
            ],
            RecordKind::Alarm | RecordKind::Attribute => &[],
        }
    }

    /// Check that `field` is registered for this kind.
    pub fn validate_field(self, field: Field) -> Result<(), RegistryError> {
        if field.kind() == self {
            Ok(())
        } else {
            Err(RegistryError::InvalidField {
                table: self.table_name().to_string(),
                field: field.column().to_string(),
            })
        }
    }

    /// Resolve a field name against this kind's registered fields.
    pub fn field(self, name: &str) -> Result<Field, RegistryError> {
        self.smoothable_fields()
            .iter()
            .copied()
            .find(|f| f.column() == name)
            .ok_or_else(|| RegistryError::InvalidField {
                table: self.table_name().to_string(),
                field: name.to_string(),
            })
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for RecordKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .iter()
            .copied()
            .find(|k| k.table_name() == s)
            .ok_or_else(|| RegistryError::InvalidTable(s.to_string()))
    }
}

/// Numeric field that can drive change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Telemetry sample value
    Value,
    Latitude,
    Longitude,
    Heading,
    Altitude,
    Speed,
    Accuracy,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Value,
        Field::Latitude,
        Field::Longitude,
        Field::Heading,
        Field::Altitude,
        Field::Speed,
        Field::Accuracy,
    ];

    /// Column name in the owning table
    pub fn column(self) -> &'static str {
        match self {
            Field::Value => "value",
            Field::Latitude => "latitude",
            Field::Longitude => "longitude",
            Field::Heading => "heading",
            Field::Altitude => "altitude",
            Field::Speed => "speed",
            Field::Accuracy => "accuracy",
        }
    }

    /// Record kind whose table owns this field
    pub fn kind(self) -> RecordKind {
        match self {
            Field::Value => RecordKind::Telemetry,
            _ => RecordKind::Location,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Field {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.column() == s)
            .ok_or_else(|| RegistryError::InvalidField {
                table: "*".to_string(),
                field: s.to_string(),
            })
    }
}

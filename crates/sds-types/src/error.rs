//! Error types shared by the smart data store crates.

use thiserror::Error;

/// Errors raised while resolving table, field and state names, or while
/// loading configuration.
///
/// These are always produced before any backend access.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Table name does not match any record kind
    #[error("Invalid table: {0}")]
    InvalidTable(String),

    /// Field name is not registered for the given table
    #[error("Invalid field '{field}' for table {table}")]
    InvalidField {
        /// Table the field was requested for
        table: String,
        /// Offending field name
        field: String,
    },

    /// Numeric field holds NaN or an infinity, which SQLite cannot store
    #[error("Non-finite value in field '{field}' for table {table}")]
    NonFinite {
        /// Table the record targets
        table: String,
        /// Offending field name
        field: String,
    },

    /// State string is not a known lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Timestamp text does not match the storage format
    #[error("Timestamp error: {0}")]
    Timestamp(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::InvalidTable("gps".to_string());
        assert_eq!(err.to_string(), "Invalid table: gps");

        let err = RegistryError::InvalidField {
            table: "telemetry".to_string(),
            field: "speed".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid field 'speed' for table telemetry");
    }
}

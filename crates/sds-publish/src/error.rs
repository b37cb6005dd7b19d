//! Error types for the publish coordinator.

use sds_storage::StorageError;
use sds_types::{RecordKind, State};
use thiserror::Error;

/// Errors that can occur while draining rows to a transport
#[derive(Error, Debug)]
pub enum PublishError {
    /// Transport refused a row; earlier rows were delivered and transitioned
    #[error("Publish of {kind} row {index} failed after {delivered} delivered: {reason}")]
    PublishFailed {
        kind: RecordKind,
        index: i64,
        delivered: usize,
        reason: String,
    },

    /// Success state would leave rows eligible for publishing again
    #[error("Invalid success state: {0}")]
    InvalidState(State),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PublishError::PublishFailed {
            kind: RecordKind::Telemetry,
            index: 2,
            delivered: 1,
            reason: "offline".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Publish of telemetry row 2 failed after 1 delivered: offline"
        );

        let err = PublishError::InvalidState(State::Unsent);
        assert_eq!(err.to_string(), "Invalid success state: unsent");
    }
}

//! Upstream transport boundary.
//!
//! The store never performs network I/O. A transport receives one row at a
//! time and reports whether it accepted it; timeouts and retries are its own
//! business.

use chrono::{DateTime, Utc};
use sds_types::{Alarm, Location};
use thiserror::Error;

/// Transport refused or failed to deliver a row
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SendError(pub String);

impl SendError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Capability for handing rows to an upstream sender.
///
/// One operation per record kind.
pub trait Transport {
    /// Send one telemetry sample. `correlation_id` is the row index.
    fn send_telemetry(
        &mut self,
        name: &str,
        value: f64,
        correlation_id: i64,
        timestamp: &DateTime<Utc>,
    ) -> Result<(), SendError>;

    /// Send one position fix
    fn send_location(&mut self, location: &Location) -> Result<(), SendError>;

    /// Send one alarm including its republish flag and correlation fields
    fn send_alarm(&mut self, alarm: &Alarm) -> Result<(), SendError>;

    /// Send one attribute value
    fn send_attribute(&mut self, name: &str, value: &str) -> Result<(), SendError>;

    /// Name of this transport for logging
    fn name(&self) -> &str;
}

//! JSON-lines transport.
//!
//! Writes one JSON object per delivered row. Used by the admin tool to drain
//! a store to a file or stdout.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sds_types::{format_timestamp, Alarm, Location};

use crate::transport::{SendError, Transport};

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Line<'a> {
    Telemetry {
        name: &'a str,
        value: f64,
        correlation_id: i64,
        timestamp: String,
    },
    Location(&'a Location),
    Alarm(&'a Alarm),
    Attribute {
        name: &'a str,
        value: &'a str,
    },
}

/// Transport that serializes rows to a writer, one per line
pub struct JsonLinesTransport<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesTransport<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Lines written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and return the writer
    pub fn into_inner(mut self) -> Result<W, SendError> {
        self.writer
            .flush()
            .map_err(|e| SendError::new(e.to_string()))?;
        Ok(self.writer)
    }

    fn write_line(&mut self, line: &Line<'_>) -> Result<(), SendError> {
        serde_json::to_writer(&mut self.writer, line).map_err(|e| SendError::new(e.to_string()))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| SendError::new(e.to_string()))?;
        self.written += 1;
        Ok(())
    }
}

impl<W: Write> Transport for JsonLinesTransport<W> {
    fn send_telemetry(
        &mut self,
        name: &str,
        value: f64,
        correlation_id: i64,
        timestamp: &DateTime<Utc>,
    ) -> Result<(), SendError> {
        self.write_line(&Line::Telemetry {
            name,
            value,
            correlation_id,
            timestamp: format_timestamp(timestamp),
        })
    }

    fn send_location(&mut self, location: &Location) -> Result<(), SendError> {
        self.write_line(&Line::Location(location))
    }

    fn send_alarm(&mut self, alarm: &Alarm) -> Result<(), SendError> {
        self.write_line(&Line::Alarm(alarm))
    }

    fn send_attribute(&mut self, name: &str, value: &str) -> Result<(), SendError> {
        self.write_line(&Line::Attribute { name, value })
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

//! Typed record payloads and persisted rows.
//!
//! One payload struct per record kind. `Record` wraps them so the storage
//! layer can dispatch on the kind with an exhaustive match.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::registry::RecordKind;
use crate::state::State;

/// Text format of the `ts` column (UTC, microsecond precision).
///
/// Fixed width, so lexicographic order matches chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Years a stored timestamp may carry. Outside them the year stops being
/// four digits wide.
const STORABLE_YEARS: std::ops::RangeInclusive<i32> = 0..=9999;

/// Format a timestamp for storage
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp.
///
/// Accepts the storage format and the same format without a fraction.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, RegistryError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|e| RegistryError::Timestamp(format!("{s}: {e}")))
}

/// A numeric telemetry sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Telemetry {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            message: None,
            description: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A location fix.
///
/// Only latitude and longitude are mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub fix_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            name: "location".to_string(),
            latitude,
            longitude,
            heading: None,
            altitude: None,
            speed: None,
            accuracy: None,
            fix_type: None,
            message: None,
        }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_fix_type(mut self, fix_type: impl Into<String>) -> Self {
        self.fix_type = Some(fix_type.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// An alarm state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub name: String,
    /// Application-defined alarm state code
    pub state: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Publish even if the state did not change since the last alarm
    #[serde(default)]
    pub republish: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Alarm {
    pub fn new(name: impl Into<String>, state: i64) -> Self {
        Self {
            name: name.into(),
            state,
            message: None,
            republish: false,
            correlation_id: None,
            latitude: None,
            longitude: None,
            description: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_republish(mut self, republish: bool) -> Self {
        self.republish = republish;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A string attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub republish: bool,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            correlation_id: None,
            description: None,
            republish: false,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_republish(mut self, republish: bool) -> Self {
        self.republish = republish;
        self
    }
}

/// Payload of any record kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Telemetry(Telemetry),
    Location(Location),
    Alarm(Alarm),
    Attribute(Attribute),
}

impl Record {
    /// Record kind, and therefore target table
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Telemetry(_) => RecordKind::Telemetry,
            Record::Location(_) => RecordKind::Location,
            Record::Alarm(_) => RecordKind::Alarm,
            Record::Attribute(_) => RecordKind::Attribute,
        }
    }

    /// Record name column
    pub fn name(&self) -> &str {
        match self {
            Record::Telemetry(t) => &t.name,
            Record::Location(l) => &l.name,
            Record::Alarm(a) => &a.name,
            Record::Attribute(a) => &a.name,
        }
    }

    /// First numeric field holding NaN or an infinity
    pub fn non_finite_field(&self) -> Option<&'static str> {
        let fields: Vec<(&'static str, Option<f64>)> = match self {
            Record::Telemetry(t) => vec![("value", Some(t.value))],
            Record::Location(l) => vec![
                ("latitude", Some(l.latitude)),
                ("longitude", Some(l.longitude)),
                ("heading", l.heading),
                ("altitude", l.altitude),
                ("speed", l.speed),
                ("accuracy", l.accuracy),
            ],
            Record::Alarm(a) => vec![("latitude", a.latitude), ("longitude", a.longitude)],
            Record::Attribute(_) => Vec::new(),
        };
        fields
            .into_iter()
            .find(|(_, v)| v.is_some_and(|v| !v.is_finite()))
            .map(|(field, _)| field)
    }
}

impl From<Telemetry> for Record {
    fn from(value: Telemetry) -> Self {
        Record::Telemetry(value)
    }
}

impl From<Location> for Record {
    fn from(value: Location) -> Self {
        Record::Location(value)
    }
}

impl From<Alarm> for Record {
    fn from(value: Alarm) -> Self {
        Record::Alarm(value)
    }
}

impl From<Attribute> for Record {
    fn from(value: Attribute) -> Self {
        Record::Attribute(value)
    }
}

/// An insert request.
///
/// A missing timestamp defaults to the current UTC time and a missing
/// state defaults to [`State::Unsent`].
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub record: Record,
    pub timestamp: Option<DateTime<Utc>>,
    pub state: Option<State>,
}

impl Entry {
    pub fn new(record: impl Into<Record>) -> Self {
        Self {
            record: record.into(),
            timestamp: None,
            state: None,
        }
    }

    /// Use a caller-supplied timestamp instead of the insert time
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Use an initial state other than `unsent`
    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    /// Check that the entry reads back exactly as written.
    ///
    /// SQLite stores NaN as NULL, and a timestamp outside years 0..=9999
    /// breaks the fixed-width ordering of the `ts` column.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if let Some(field) = self.record.non_finite_field() {
            return Err(RegistryError::NonFinite {
                table: self.record.kind().to_string(),
                field: field.to_string(),
            });
        }
        if let Some(ts) = &self.timestamp {
            if !STORABLE_YEARS.contains(&ts.year()) {
                return Err(RegistryError::Timestamp(format!(
                    "{ts} is outside years 0..=9999"
                )));
            }
        }
        Ok(())
    }
}

/// A persisted row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Auto-incrementing primary key, insertion order
    pub index: i64,
    pub timestamp: DateTime<Utc>,
    pub state: State,
    pub record: Record,
}

impl Row {
    pub fn kind(&self) -> RecordKind {
        self.record.kind()
    }

    /// Timestamp in storage format
    pub fn timestamp_text(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_timestamp_format_has_microseconds() {
        let ts = Utc
            .with_ymd_and_hms(2024, 1, 29, 8, 5, 9)
            .unwrap()
            .with_nanosecond(42_000)
            .unwrap();
        assert_eq!(format_timestamp(&ts), "2024-01-29 08:05:09.000042");
        assert_eq!(parse_timestamp("2024-01-29 08:05:09.000042").unwrap(), ts);
    }

    #[test]
    fn test_parse_timestamp_without_fraction() {
        let ts = parse_timestamp("2024-01-29 08:05:09").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 29, 8, 5, 9).unwrap());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_timestamp_text_orders_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        assert!(format_timestamp(&early) < format_timestamp(&late));
    }

    #[test]
    fn test_entry_defaults() {
        let entry = Entry::new(Telemetry::new("temp", 21.5));
        assert_eq!(entry.record.kind(), RecordKind::Telemetry);
        assert!(entry.timestamp.is_none());
        assert!(entry.state.is_none());

        let entry = entry.with_state(State::Retain);
        assert_eq!(entry.state, Some(State::Retain));
    }

    #[test]
    fn test_record_serializes_with_kind_tag() {
        let record = Record::from(Alarm::new("door", 1).with_republish(true));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "alarm");
        assert_eq!(json["republish"], true);
    }

    #[test]
    fn test_validate_rejects_non_finite_values() {
        assert!(Entry::new(Telemetry::new("t", 1.5)).validate().is_ok());

        let err = Entry::new(Telemetry::new("t", f64::NAN)).validate().unwrap_err();
        assert_eq!(err.to_string(), "Non-finite value in field 'value' for table telemetry");

        let fix = Location::new(45.0, -75.0).with_speed(f64::INFINITY);
        assert!(matches!(
            Entry::new(fix).validate(),
            Err(RegistryError::NonFinite { field, .. }) if field == "speed"
        ));

        let alarm = Alarm::new("door", 1).with_position(f64::NEG_INFINITY, 0.0);
        assert_eq!(Record::from(alarm).non_finite_field(), Some("latitude"));
        assert_eq!(Record::from(Attribute::new("fw", "1")).non_finite_field(), None);
    }

    #[test]
    fn test_validate_rejects_unorderable_timestamps() {
        let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
        assert!(Entry::new(Telemetry::new("t", 1.0)).at(last).validate().is_ok());
        assert_eq!(format_timestamp(&last).len(), "2024-01-29 08:05:09.000042".len());

        let far = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
        let err = Entry::new(Telemetry::new("t", 1.0)).at(far).validate().unwrap_err();
        assert!(matches!(err, RegistryError::Timestamp(_)));

        let before = Utc.with_ymd_and_hms(-1, 6, 1, 0, 0, 0).unwrap();
        assert!(Entry::new(Telemetry::new("t", 1.0)).at(before).validate().is_err());
    }
}

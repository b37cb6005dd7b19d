//! End-to-end test infrastructure for the smart data store.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! covering insert, retention, smoothing and publish against a file-backed
//! store.

use std::path::PathBuf;

use chrono::{DateTime, Duration, TimeZone, Utc};

use sds_publish::{SendError, Transport};
use sds_storage::Store;
use sds_types::{Alarm, Entry, Location, RecordKind, RetentionPolicy, State, Telemetry};

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Path of the database file
    pub db_path: PathBuf,
    pub store: Store,
}

impl TestHarness {
    /// Create a new harness with a fresh store under a temp directory.
    pub fn new() -> Self {
        Self::with_policy(RetentionPolicy::default())
    }

    /// Create a harness whose store uses `policy`.
    pub fn with_policy(policy: RetentionPolicy) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("sds.db");
        let store =
            Store::open_with_policy(&db_path, None, policy).expect("Failed to open test store");

        Self {
            _temp_dir: temp_dir,
            db_path,
            store,
        }
    }

    /// Close and reopen the store from disk.
    pub fn reopen(self) -> Self {
        let policy = self.store.retention_policy();
        self.store.close().expect("Failed to close store");
        let store =
            Store::open_with_policy(&self.db_path, None, policy).expect("Failed to reopen store");
        Self { store, ..self }
    }

    /// Indices of every row of `kind` in `state`.
    pub fn indices_in(&self, kind: RecordKind, state: State) -> Vec<i64> {
        self.store
            .select_by_state(kind, state)
            .map(|r| r.expect("Failed to read row").index)
            .collect()
    }

    /// States of every row of `kind`, in index order.
    pub fn states(&self, kind: RecordKind) -> Vec<State> {
        self.store
            .select_all(kind)
            .map(|r| r.expect("Failed to read row").state)
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Base timestamp for deterministic test data (2024-01-29 08:00 UTC)
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 29, 8, 0, 0).unwrap()
}

/// Insert telemetry samples one second apart, returning their indices.
pub fn insert_series(store: &mut Store, name: &str, values: &[f64]) -> Vec<i64> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let entry = Entry::new(Telemetry::new(name, *v)).at(base_time() + Duration::seconds(i as i64));
            store.insert(entry).expect("Failed to insert telemetry")
        })
        .collect()
}

/// Insert one row of every kind.
pub fn insert_one_of_each(store: &mut Store) {
    store
        .insert_telemetry("temperature", 21.5)
        .expect("Failed to insert telemetry");
    store
        .insert_location(Location::new(45.42, -75.69).with_fix_type("3d"))
        .expect("Failed to insert location");
    store
        .insert_alarm(Alarm::new("door", 1).with_republish(true))
        .expect("Failed to insert alarm");
    store
        .insert_attribute("firmware", "2.1.0")
        .expect("Failed to insert attribute");
}

/// Transport that records sends and can be told to refuse one call.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    /// Kind and identifying detail of every attempted send
    pub sent: Vec<(RecordKind, String)>,
    /// 1-based call number to refuse
    pub fail_on: Option<usize>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            sent: Vec::new(),
            fail_on: Some(call),
        }
    }

    fn record(&mut self, kind: RecordKind, detail: String) -> Result<(), SendError> {
        self.sent.push((kind, detail));
        if Some(self.sent.len()) == self.fail_on {
            return Err(SendError::new("uplink unavailable"));
        }
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn send_telemetry(
        &mut self,
        name: &str,
        value: f64,
        correlation_id: i64,
        _timestamp: &DateTime<Utc>,
    ) -> Result<(), SendError> {
        self.record(
            RecordKind::Telemetry,
            format!("{name}={value}#{correlation_id}"),
        )
    }

    fn send_location(&mut self, location: &Location) -> Result<(), SendError> {
        self.record(
            RecordKind::Location,
            format!("{},{}", location.latitude, location.longitude),
        )
    }

    fn send_alarm(&mut self, alarm: &Alarm) -> Result<(), SendError> {
        self.record(RecordKind::Alarm, format!("{}={}", alarm.name, alarm.state))
    }

    fn send_attribute(&mut self, name: &str, value: &str) -> Result<(), SendError> {
        self.record(RecordKind::Attribute, format!("{name}={value}"))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

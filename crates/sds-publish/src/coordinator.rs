//! Publish coordinator.
//!
//! Drains unsent rows to a [`Transport`] in two phases: a send loop that
//! stops at the first refusal, then an update loop that moves every
//! delivered row to the success state. A crash between the phases leaves
//! delivered rows `unsent`, so delivery is at-least-once.

use tracing::{debug, info, warn};

use sds_storage::{StorageError, Store};
use sds_types::{Record, RecordKind, Row, State};

use crate::error::PublishError;
use crate::transport::{SendError, Transport};

/// Result of publishing one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub kind: RecordKind,
    /// Rows the transport accepted
    pub delivered: usize,
    /// Delivered rows moved to the success state
    pub transitioned: usize,
    /// Delivered rows whose state update failed; they stay `unsent`
    pub update_failures: Vec<i64>,
}

impl PublishReport {
    fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            delivered: 0,
            transitioned: 0,
            update_failures: Vec::new(),
        }
    }

    /// Check if any rows were delivered.
    pub fn has_updates(&self) -> bool {
        self.delivered > 0
    }
}

/// Configuration for the publish coordinator.
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// State applied to delivered rows
    pub success_state: State,
    /// Upper bound on rows sent per table and call; `None` drains everything
    pub max_rows: Option<usize>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            success_state: State::Sent,
            max_rows: None,
        }
    }
}

impl PublishConfig {
    /// Set the state applied to delivered rows.
    pub fn with_success_state(mut self, state: State) -> Self {
        self.success_state = state;
        self
    }

    /// Limit rows sent per table and call.
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = Some(max_rows);
        self
    }
}

/// Why the send loop stopped early
enum Halt {
    Refused { index: i64, error: SendError },
    Storage(StorageError),
}

/// Hands unsent rows to a transport and records the outcome in the store.
pub struct PublishCoordinator {
    config: PublishConfig,
}

impl PublishCoordinator {
    /// Create a coordinator, rejecting a success state that is still `unsent`.
    pub fn new(config: PublishConfig) -> Result<Self, PublishError> {
        if config.success_state == State::Unsent {
            return Err(PublishError::InvalidState(config.success_state));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// Publish the unsent rows of one table.
    ///
    /// On a transport refusal no further rows are sent, the rows delivered
    /// before it are still transitioned, and
    /// [`PublishError::PublishFailed`] is returned.
    pub fn publish_unsent(
        &self,
        store: &mut Store,
        kind: RecordKind,
        transport: &mut dyn Transport,
    ) -> Result<PublishReport, PublishError> {
        let limit = self.config.max_rows.unwrap_or(usize::MAX);
        let mut delivered = Vec::new();
        let mut halt = None;

        for row in store.select_by_state(kind, State::Unsent).take(limit) {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    halt = Some(Halt::Storage(e));
                    break;
                }
            };
            match send_row(transport, &row) {
                Ok(()) => {
                    debug!(kind = %kind, index = row.index, transport = transport.name(), "Delivered row");
                    delivered.push(row.index);
                }
                Err(error) => {
                    halt = Some(Halt::Refused {
                        index: row.index,
                        error,
                    });
                    break;
                }
            }
        }

        let mut report = PublishReport::new(kind);
        report.delivered = delivered.len();
        for index in delivered {
            match store.update_state(kind, index, self.config.success_state) {
                Ok(()) => report.transitioned += 1,
                Err(e) => {
                    warn!(kind = %kind, index, error = %e, "Delivered row left unsent");
                    report.update_failures.push(index);
                }
            }
        }

        match halt {
            None => {
                info!(
                    kind = %kind,
                    delivered = report.delivered,
                    transitioned = report.transitioned,
                    "Publish complete"
                );
                Ok(report)
            }
            Some(Halt::Refused { index, error }) => {
                warn!(
                    kind = %kind,
                    index,
                    delivered = report.delivered,
                    error = %error,
                    "Publish halted"
                );
                Err(PublishError::PublishFailed {
                    kind,
                    index,
                    delivered: report.delivered,
                    reason: error.to_string(),
                })
            }
            Some(Halt::Storage(e)) => Err(e.into()),
        }
    }

    /// Publish every table in registry order, stopping at the first failure.
    pub fn publish_all(
        &self,
        store: &mut Store,
        transport: &mut dyn Transport,
    ) -> Result<Vec<PublishReport>, PublishError> {
        let mut reports = Vec::with_capacity(RecordKind::ALL.len());
        for kind in RecordKind::ALL {
            reports.push(self.publish_unsent(store, kind, transport)?);
        }
        Ok(reports)
    }
}

fn send_row(transport: &mut dyn Transport, row: &Row) -> Result<(), SendError> {
    match &row.record {
        Record::Telemetry(t) => transport.send_telemetry(&t.name, t.value, row.index, &row.timestamp),
        Record::Location(l) => transport.send_location(l),
        Record::Alarm(a) => transport.send_alarm(a),
        Record::Attribute(a) => transport.send_attribute(&a.name, &a.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;
    use sds_types::{Alarm, Location};

    /// Records every call and refuses the call numbered `fail_on` (1-based)
    #[derive(Default)]
    struct MockTransport {
        calls: Vec<String>,
        fail_on: Option<usize>,
    }

    impl MockTransport {
        fn failing_on(call: usize) -> Self {
            Self {
                calls: Vec::new(),
                fail_on: Some(call),
            }
        }

        fn record(&mut self, call: String) -> Result<(), SendError> {
            self.calls.push(call);
            if Some(self.calls.len()) == self.fail_on {
                return Err(SendError::new("link down"));
            }
            Ok(())
        }
    }

    impl Transport for MockTransport {
        fn send_telemetry(
            &mut self,
            name: &str,
            value: f64,
            correlation_id: i64,
            _timestamp: &DateTime<Utc>,
        ) -> Result<(), SendError> {
            self.record(format!("telemetry {name}={value} #{correlation_id}"))
        }

        fn send_location(&mut self, location: &Location) -> Result<(), SendError> {
            self.record(format!("location {},{}", location.latitude, location.longitude))
        }

        fn send_alarm(&mut self, alarm: &Alarm) -> Result<(), SendError> {
            self.record(format!("alarm {}={} repub={}", alarm.name, alarm.state, alarm.republish))
        }

        fn send_attribute(&mut self, name: &str, value: &str) -> Result<(), SendError> {
            self.record(format!("attribute {name}={value}"))
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn states(store: &Store, kind: RecordKind) -> Vec<State> {
        store.select_all(kind).map(|r| r.unwrap().state).collect()
    }

    fn coordinator(state: State) -> PublishCoordinator {
        PublishCoordinator::new(PublishConfig::default().with_success_state(state)).unwrap()
    }

    #[test]
    fn test_publish_all_rows() {
        let mut store = Store::open_in_memory().unwrap();
        store.insert_telemetry("temp", 1.0).unwrap();
        store.insert_telemetry("temp", 2.0).unwrap();
        let mut transport = MockTransport::default();

        let report = coordinator(State::Sent)
            .publish_unsent(&mut store, RecordKind::Telemetry, &mut transport)
            .unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.transitioned, 2);
        assert!(report.update_failures.is_empty());
        assert_eq!(
            transport.calls,
            vec!["telemetry temp=1 #1".to_string(), "telemetry temp=2 #2".to_string()]
        );
        assert_eq!(states(&store, RecordKind::Telemetry), vec![State::Sent, State::Sent]);
    }

    #[test]
    fn test_publish_halts_on_first_failure() {
        let mut store = Store::open_in_memory().unwrap();
        for v in [1.0, 2.0, 3.0] {
            store.insert_telemetry("temp", v).unwrap();
        }
        let mut transport = MockTransport::failing_on(2);

        let err = coordinator(State::Retain)
            .publish_unsent(&mut store, RecordKind::Telemetry, &mut transport)
            .unwrap_err();

        match err {
            PublishError::PublishFailed {
                kind,
                index,
                delivered,
                ..
            } => {
                assert_eq!(kind, RecordKind::Telemetry);
                assert_eq!(index, 2);
                assert_eq!(delivered, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.calls.len(), 2);
        assert_eq!(
            states(&store, RecordKind::Telemetry),
            vec![State::Retain, State::Unsent, State::Unsent]
        );
    }

    #[test]
    fn test_retry_resends_only_unsent() {
        let mut store = Store::open_in_memory().unwrap();
        for v in [1.0, 2.0, 3.0] {
            store.insert_telemetry("temp", v).unwrap();
        }
        let coordinator = coordinator(State::Sent);
        let mut failing = MockTransport::failing_on(2);
        assert!(coordinator
            .publish_unsent(&mut store, RecordKind::Telemetry, &mut failing)
            .is_err());

        let mut healthy = MockTransport::default();
        let report = coordinator
            .publish_unsent(&mut store, RecordKind::Telemetry, &mut healthy)
            .unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(
            healthy.calls,
            vec!["telemetry temp=2 #2".to_string(), "telemetry temp=3 #3".to_string()]
        );
    }

    #[test]
    fn test_max_rows_limits_batch() {
        let mut store = Store::open_in_memory().unwrap();
        for i in 0..5 {
            store.insert_attribute(format!("a{i}"), "x").unwrap();
        }
        let coordinator = PublishCoordinator::new(PublishConfig::default().with_max_rows(3)).unwrap();
        let mut transport = MockTransport::default();

        let report = coordinator
            .publish_unsent(&mut store, RecordKind::Attribute, &mut transport)
            .unwrap();
        assert_eq!(report.delivered, 3);
        assert_eq!(
            store
                .select_by_state(RecordKind::Attribute, State::Unsent)
                .count(),
            2
        );
    }

    #[test]
    fn test_alarm_carries_republish_flag() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .insert_alarm(Alarm::new("door", 1).with_republish(true))
            .unwrap();
        let mut transport = MockTransport::default();

        coordinator(State::Published)
            .publish_unsent(&mut store, RecordKind::Alarm, &mut transport)
            .unwrap();
        assert_eq!(transport.calls, vec!["alarm door=1 repub=true".to_string()]);
        assert_eq!(states(&store, RecordKind::Alarm), vec![State::Published]);
    }

    #[test]
    fn test_publish_all_stops_at_failing_kind() {
        let mut store = Store::open_in_memory().unwrap();
        store.insert_telemetry("temp", 1.0).unwrap();
        store.insert_location(Location::new(1.0, 2.0)).unwrap();
        store.insert_alarm(Alarm::new("door", 1)).unwrap();
        let mut transport = MockTransport::failing_on(2);

        let err = coordinator(State::Sent)
            .publish_all(&mut store, &mut transport)
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::PublishFailed {
                kind: RecordKind::Location,
                ..
            }
        ));
        assert_eq!(transport.calls.len(), 2);
        assert_eq!(states(&store, RecordKind::Telemetry), vec![State::Sent]);
        assert_eq!(states(&store, RecordKind::Alarm), vec![State::Unsent]);
    }

    #[test]
    fn test_unsent_success_state_rejected() {
        let result = PublishCoordinator::new(PublishConfig::default().with_success_state(State::Unsent));
        assert!(matches!(result, Err(PublishError::InvalidState(State::Unsent))));
    }

    #[test]
    fn test_empty_table() {
        let mut store = Store::open_in_memory().unwrap();
        let mut transport = MockTransport::default();
        let report = coordinator(State::Sent)
            .publish_unsent(&mut store, RecordKind::Location, &mut transport)
            .unwrap();
        assert!(!report.has_updates());
        assert!(transport.calls.is_empty());
    }
}

//! Retention enforcement.
//!
//! Runs before every insert and bounds the target table only. Each
//! eviction is one parameterized `DELETE` inside its own transaction.

use chrono::{Duration, Utc};
use rusqlite::params;
use tracing::{debug, warn};

use sds_types::{format_timestamp, DropMode, RecordKind, RetentionPolicy};

use crate::db::Store;
use crate::error::StorageError;
use crate::tables;

/// Result of one retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionOutcome {
    /// Rows deleted by this pass
    pub evicted: usize,
}

impl Store {
    /// Apply the active retention policy to one table.
    ///
    /// Under `LimitedCount` a table at its limit either loses its
    /// `num_to_age` oldest rows or, with `KeepOldest`, reports
    /// [`StorageError::StorageFull`]. Under `MaxDays` rows stamped strictly
    /// before `now - days` are deleted; a row exactly at the cutoff stays.
    pub fn apply_retention(&mut self, kind: RecordKind) -> Result<RetentionOutcome, StorageError> {
        let sql = tables::sql(kind);

        let evicted = match self.retention_policy() {
            RetentionPolicy::LimitedCount {
                max_entries,
                num_to_age,
                drop_mode,
            } => {
                let count = self
                    .conn()
                    .query_row(sql.count, [], |r| r.get::<_, i64>(0))
                    .map_err(|source| StorageError::RetentionFailed { kind, source })?
                    as u64;

                if count < max_entries {
                    return Ok(RetentionOutcome::default());
                }

                match drop_mode {
                    DropMode::KeepOldest => {
                        return Err(StorageError::StorageFull {
                            kind,
                            count,
                            max_entries,
                        });
                    }
                    DropMode::AgeOldest => {
                        let batch = i64::try_from(num_to_age).unwrap_or(i64::MAX);
                        self.transact(|tx| tx.execute(sql.delete_oldest, params![batch]))
                            .map_err(|source| StorageError::RetentionFailed { kind, source })?
                    }
                }
            }
            RetentionPolicy::MaxDays { days } => {
                // A window reaching past the earliest representable date has no expired rows
                let cutoff = Duration::try_days(i64::from(days))
                    .and_then(|window| Utc::now().checked_sub_signed(window));
                match cutoff {
                    Some(cutoff) => {
                        let cutoff = format_timestamp(&cutoff);
                        self.transact(|tx| tx.execute(sql.delete_before, params![cutoff]))
                            .map_err(|source| StorageError::RetentionFailed { kind, source })?
                    }
                    None => 0,
                }
            }
        };

        if evicted > 0 {
            warn!(kind = %kind, evicted, "Retention evicted rows");
        } else {
            debug!(kind = %kind, "Retention found nothing to evict");
        }
        Ok(RetentionOutcome { evicted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sds_types::{Entry, State, Telemetry};

    fn limited_store(max_entries: u64, num_to_age: u64, drop_mode: DropMode) -> Store {
        let mut store = Store::open_in_memory().unwrap();
        store
            .set_retention_policy(RetentionPolicy::limited(max_entries, num_to_age, drop_mode))
            .unwrap();
        store
    }

    fn indices(store: &Store, kind: RecordKind) -> Vec<i64> {
        store.select_all(kind).map(|r| r.unwrap().index).collect()
    }

    #[test]
    fn test_age_oldest_evicts_batch() {
        let mut store = limited_store(10, 3, DropMode::AgeOldest);
        for i in 0..10 {
            store.insert_telemetry("t", i as f64).unwrap();
        }
        assert_eq!(store.row_count(RecordKind::Telemetry), 10);

        let newest = store.insert_telemetry("t", 99.0).unwrap();

        assert_eq!(store.row_count(RecordKind::Telemetry), 10 - 3 + 1);
        let mut expected: Vec<i64> = (4..=10).collect();
        expected.push(newest);
        assert_eq!(indices(&store, RecordKind::Telemetry), expected);
    }

    #[test]
    fn test_below_limit_is_untouched() {
        let mut store = limited_store(5, 2, DropMode::AgeOldest);
        store.insert_telemetry("t", 1.0).unwrap();
        let outcome = store.apply_retention(RecordKind::Telemetry).unwrap();
        assert_eq!(outcome.evicted, 0);
        assert_eq!(store.row_count(RecordKind::Telemetry), 1);
    }

    #[test]
    fn test_retention_is_per_table() {
        let mut store = limited_store(2, 2, DropMode::AgeOldest);
        store.insert_attribute("a", "1").unwrap();
        store.insert_attribute("b", "2").unwrap();
        store.insert_telemetry("t", 1.0).unwrap();
        store.insert_telemetry("t", 2.0).unwrap();
        store.insert_telemetry("t", 3.0).unwrap();

        assert_eq!(store.row_count(RecordKind::Attribute), 2);
        assert_eq!(store.row_count(RecordKind::Telemetry), 1);
    }

    #[test]
    fn test_keep_oldest_rejects_insert() {
        let mut store = limited_store(3, 1, DropMode::KeepOldest);
        for i in 0..3 {
            store.insert_telemetry("t", i as f64).unwrap();
        }

        let err = store.insert_telemetry("t", 3.0).unwrap_err();
        assert!(matches!(
            err,
            StorageError::StorageFull {
                count: 3,
                max_entries: 3,
                ..
            }
        ));
        assert_eq!(indices(&store, RecordKind::Telemetry), vec![1, 2, 3]);
    }

    #[test]
    fn test_max_days_boundary() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .set_retention_policy(RetentionPolicy::max_days(2))
            .unwrap();

        let now = Utc::now();
        let expired = store
            .insert(Entry::new(Telemetry::new("old", 1.0)).at(now - Duration::days(2) - Duration::minutes(5)))
            .unwrap();
        let fresh = store
            .insert(Entry::new(Telemetry::new("young", 2.0)).at(now - Duration::days(2) + Duration::minutes(5)))
            .unwrap();
        // The insert above already ran retention and removed the expired row
        assert_eq!(indices(&store, RecordKind::Telemetry), vec![fresh]);
        assert!(fresh > expired);

        let latest = store.insert_telemetry("now", 3.0).unwrap();
        assert_eq!(indices(&store, RecordKind::Telemetry), vec![fresh, latest]);
    }

    #[test]
    fn test_max_days_ignores_state() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .set_retention_policy(RetentionPolicy::max_days(1))
            .unwrap();
        store
            .insert(
                Entry::new(Telemetry::new("kept", 1.0))
                    .at(Utc::now() - Duration::days(3))
                    .with_state(State::Retain),
            )
            .unwrap();

        let outcome = store.apply_retention(RecordKind::Telemetry).unwrap();
        assert_eq!(outcome.evicted, 1);
    }

    #[test]
    fn test_huge_max_days_keeps_everything() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .set_retention_policy(RetentionPolicy::max_days(200_000_000))
            .unwrap();
        store
            .insert(Entry::new(Telemetry::new("ancient", 1.0)).at(Utc::now() - Duration::days(3650)))
            .unwrap();
        store.insert_telemetry("t", 2.0).unwrap();

        assert_eq!(store.row_count(RecordKind::Telemetry), 2);
        let outcome = store.apply_retention(RecordKind::Telemetry).unwrap();
        assert_eq!(outcome.evicted, 0);
    }

    #[test]
    fn test_retention_failure_does_not_block_insert() {
        let mut store = limited_store(1, 1, DropMode::AgeOldest);
        store.insert_telemetry("t", 1.0).unwrap();
        store
            .raw_execute(
                "CREATE TRIGGER block_delete BEFORE DELETE ON telemetry
                 BEGIN SELECT RAISE(ABORT, 'pinned'); END;",
            )
            .unwrap();

        assert!(matches!(
            store.apply_retention(RecordKind::Telemetry),
            Err(StorageError::RetentionFailed { .. })
        ));

        store.insert_telemetry("t", 2.0).unwrap();
        assert_eq!(store.row_count(RecordKind::Telemetry), 2);
    }
}

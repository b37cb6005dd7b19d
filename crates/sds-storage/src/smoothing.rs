//! Change-detection filter.
//!
//! Marks unsent samples that differ from the sample before them by no more
//! than a threshold. Comparison chains along the raw sequence, so a slow
//! drift is suppressed step by step.

use tracing::{info, warn};

use sds_types::{Field, Record, RecordKind, Row, State};

use crate::db::Store;
use crate::error::StorageError;

/// Result of one smoothing pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmoothOutcome {
    /// Every index selected for marking, ascending
    pub marked: Vec<i64>,
    /// Indices whose state update failed
    pub failed: Vec<i64>,
}

/// Whether `current` is within `threshold` of `previous`
pub fn is_insignificant(previous: f64, current: f64, threshold: f64) -> bool {
    current == previous
        || (current > previous && current - threshold <= previous)
        || (current < previous && current + threshold >= previous)
}

/// Value of `field` in a row, `None` when the column is NULL or the row
/// belongs to another kind
pub fn field_value(row: &Row, field: Field) -> Option<f64> {
    match (&row.record, field) {
        (Record::Telemetry(t), Field::Value) => Some(t.value),
        (Record::Location(l), Field::Latitude) => Some(l.latitude),
        (Record::Location(l), Field::Longitude) => Some(l.longitude),
        (Record::Location(l), Field::Heading) => l.heading,
        (Record::Location(l), Field::Altitude) => l.altitude,
        (Record::Location(l), Field::Speed) => l.speed,
        (Record::Location(l), Field::Accuracy) => l.accuracy,
        _ => None,
    }
}

/// Indices of insignificant samples in an ordered sequence.
///
/// A missing value is never marked and breaks the chain.
pub fn insignificant_indices<I>(samples: I, threshold: f64) -> Vec<i64>
where
    I: IntoIterator<Item = (i64, Option<f64>)>,
{
    let mut previous: Option<f64> = None;
    let mut marked = Vec::new();

    for (index, value) in samples {
        if let (Some(prev), Some(curr)) = (previous, value) {
            if is_insignificant(prev, curr, threshold) {
                marked.push(index);
            }
        }
        previous = value;
    }
    marked
}

impl Store {
    /// Mark insignificant unsent rows of `kind` with `mark_state`.
    ///
    /// The field is checked against the table before anything is read.
    /// A failed update is logged and recorded in the outcome; the remaining
    /// rows are still marked.
    pub fn smooth(
        &mut self,
        kind: RecordKind,
        field: Field,
        threshold: f64,
        mark_state: State,
    ) -> Result<SmoothOutcome, StorageError> {
        kind.validate_field(field)?;

        let samples = self
            .select_by_state(kind, State::Unsent)
            .map(|row| row.map(|r| (r.index, field_value(&r, field))))
            .collect::<Result<Vec<_>, _>>()?;
        let marked = insignificant_indices(samples, threshold);

        let mut failed = Vec::new();
        for &index in &marked {
            if let Err(e) = self.update_state(kind, index, mark_state) {
                warn!(kind = %kind, index, error = %e, "Failed to mark row");
                failed.push(index);
            }
        }

        info!(
            kind = %kind,
            field = %field,
            threshold,
            marked = marked.len(),
            failed = failed.len(),
            "Smoothing pass complete"
        );
        Ok(SmoothOutcome { marked, failed })
    }
}

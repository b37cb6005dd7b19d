//! Forward-only row cursor.
//!
//! Rows are fetched lazily in pages keyed on the last index seen
//! (`idx > last ORDER BY idx`), so a cursor never holds a statement open
//! between pages. The cursor borrows the store immutably; it has to be
//! dropped before the store can be mutated again.

use std::collections::VecDeque;

use rusqlite::{params, Connection};
use sds_types::{RecordKind, Row, State};

use crate::error::StorageError;
use crate::tables;

/// Rows fetched per page
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// Lazy, finite, single-pass iterator over the rows of one table in
/// ascending index order.
pub struct RowCursor<'a> {
    conn: &'a Connection,
    kind: RecordKind,
    state: Option<State>,
    last_index: i64,
    page_size: usize,
    buffer: VecDeque<Row>,
    failed: Option<StorageError>,
    exhausted: bool,
}

impl<'a> RowCursor<'a> {
    pub(crate) fn new(conn: &'a Connection, kind: RecordKind, state: Option<State>) -> Self {
        Self {
            conn,
            kind,
            state,
            last_index: 0,
            page_size: DEFAULT_PAGE_SIZE,
            buffer: VecDeque::new(),
            failed: None,
            exhausted: false,
        }
    }

    /// Change how many rows are fetched per round trip
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Table being scanned
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    fn fetch_page(&mut self) -> Result<(), StorageError> {
        let conn = self.conn;
        let kind = self.kind;
        let sql = tables::sql(kind);
        let after = self.last_index;
        let limit = self.page_size as i64;

        let fetched = match self.state {
            Some(state) => {
                let mut stmt = conn.prepare_cached(sql.select_state_after)?;
                let rows = stmt.query_map(params![state.as_str(), after, limit], |r| {
                    tables::read_row(kind, r)
                })?;
                self.buffer_rows(rows)
            }
            None => {
                let mut stmt = conn.prepare_cached(sql.select_after)?;
                let rows =
                    stmt.query_map(params![after, limit], |r| tables::read_row(kind, r))?;
                self.buffer_rows(rows)
            }
        };

        if fetched < self.page_size {
            self.exhausted = true;
        }
        Ok(())
    }

    /// Buffer decoded rows up to the first one that fails.
    ///
    /// The failure is held back until the rows before it have been yielded.
    fn buffer_rows(&mut self, rows: impl Iterator<Item = rusqlite::Result<Row>>) -> usize {
        let mut fetched = 0;
        for row in rows {
            fetched += 1;
            match row {
                Ok(row) => {
                    self.last_index = row.index;
                    self.buffer.push_back(row);
                }
                Err(e) => {
                    self.failed = Some(e.into());
                    self.exhausted = true;
                    break;
                }
            }
        }
        fetched
    }
}

impl Iterator for RowCursor<'_> {
    type Item = Result<Row, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        match self.buffer.pop_front() {
            Some(row) => Some(Ok(row)),
            None => self.failed.take().map(Err),
        }
    }
}

impl std::iter::FusedIterator for RowCursor<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use sds_types::{Record, Telemetry};

    fn seeded(count: usize) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        tables::create_all(&conn).unwrap();
        for i in 0..count {
            let state = if i % 2 == 0 { State::Unsent } else { State::Sent };
            let record = Record::from(Telemetry::new("t", i as f64));
            tables::insert_record(&conn, &record, "2024-01-01 00:00:00.000000", state).unwrap();
        }
        conn
    }

    #[test]
    fn test_cursor_spans_pages_in_order() {
        let conn = seeded(10);
        let rows: Vec<_> = RowCursor::new(&conn, RecordKind::Telemetry, None)
            .with_page_size(3)
            .collect::<Result<_, _>>()
            .unwrap();
        let indices: Vec<i64> = rows.iter().map(|r| r.index).collect();
        assert_eq!(indices, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_cursor_filters_by_state() {
        let conn = seeded(7);
        let rows: Vec<_> = RowCursor::new(&conn, RecordKind::Telemetry, Some(State::Unsent))
            .with_page_size(2)
            .collect::<Result<_, _>>()
            .unwrap();
        let indices: Vec<i64> = rows.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 3, 5, 7]);
        assert!(rows.iter().all(|r| r.state == State::Unsent));
    }

    #[test]
    fn test_cursor_on_empty_table() {
        let conn = seeded(0);
        let mut cursor = RowCursor::new(&conn, RecordKind::Alarm, None);
        assert!(cursor.next().is_none());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_cursor_stops_after_bad_row() {
        let conn = seeded(2);
        conn.execute("UPDATE telemetry SET status = 'bogus' WHERE idx = 1", [])
            .unwrap();

        let mut cursor = RowCursor::new(&conn, RecordKind::Telemetry, None);
        assert!(matches!(cursor.next(), Some(Err(StorageError::Sqlite(_)))));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_cursor_yields_rows_before_bad_row() {
        let conn = seeded(5);
        conn.execute("UPDATE telemetry SET value = NULL WHERE idx = 3", [])
            .unwrap();

        let mut cursor = RowCursor::new(&conn, RecordKind::Telemetry, None).with_page_size(10);
        assert_eq!(cursor.next().unwrap().unwrap().index, 1);
        assert_eq!(cursor.next().unwrap().unwrap().index, 2);
        assert!(matches!(cursor.next(), Some(Err(StorageError::Sqlite(_)))));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_bad_row_on_later_page_keeps_earlier_pages() {
        let conn = seeded(6);
        conn.execute("UPDATE telemetry SET status = 'bogus' WHERE idx = 5", [])
            .unwrap();

        let results: Vec<_> = RowCursor::new(&conn, RecordKind::Telemetry, None)
            .with_page_size(2)
            .collect();
        let indices: Vec<i64> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|row| row.index))
            .collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        assert!(results.last().unwrap().is_err());
        assert_eq!(results.len(), 5);
    }
}

//! Per-table SQL.
//!
//! Every statement is a compile-time constant selected by record kind, so
//! table and column names never pass through string formatting at runtime.
//! All values are bound as parameters.
//!
//! - telemetry: numeric samples
//! - location: position fixes
//! - alarm: alarm state changes
//! - attribute: string attributes

use rusqlite::types::Type;
use rusqlite::{params, Connection};

use sds_types::{
    parse_timestamp, Alarm, Attribute, Location, Record, RecordKind, RegistryError, Row, State,
    Telemetry,
};

/// Statements for one table
pub(crate) struct TableSql {
    /// Table and status index creation (batch)
    pub create: &'static str,
    pub insert: &'static str,
    /// `?1` = last seen idx, `?2` = page size
    pub select_after: &'static str,
    /// `?1` = state, `?2` = last seen idx, `?3` = page size
    pub select_state_after: &'static str,
    /// `?1` = state, `?2` = idx
    pub update_state: &'static str,
    pub count: &'static str,
    pub count_by_state: &'static str,
    /// `?1` = number of rows
    pub delete_oldest: &'static str,
    /// `?1` = cutoff timestamp text
    pub delete_before: &'static str,
    /// `?1` = state
    pub delete_by_state: &'static str,
    /// `?1` = idx
    pub delete_row: &'static str,
}

macro_rules! table_sql {
    ($table:literal, $columns:literal, $placeholders:literal, $schema:literal) => {
        TableSql {
            create: concat!(
                "CREATE TABLE IF NOT EXISTS ", $table, " (", $schema, ");",
                "CREATE INDEX IF NOT EXISTS ", $table, "_status_idx ON ", $table, " (status);"
            ),
            insert: concat!("INSERT INTO ", $table, " (", $columns, ") VALUES (", $placeholders, ")"),
            select_after: concat!(
                "SELECT idx, ", $columns, " FROM ", $table,
                " WHERE idx > ?1 ORDER BY idx ASC LIMIT ?2"
            ),
            select_state_after: concat!(
                "SELECT idx, ", $columns, " FROM ", $table,
                " WHERE status = ?1 AND idx > ?2 ORDER BY idx ASC LIMIT ?3"
            ),
            update_state: concat!("UPDATE ", $table, " SET status = ?1 WHERE idx = ?2"),
            count: concat!("SELECT count(idx) FROM ", $table),
            count_by_state: concat!("SELECT status, count(idx) FROM ", $table, " GROUP BY status"),
            delete_oldest: concat!(
                "DELETE FROM ", $table, " WHERE idx IN (SELECT idx FROM ", $table,
                " ORDER BY idx ASC LIMIT ?1)"
            ),
            delete_before: concat!("DELETE FROM ", $table, " WHERE ts < ?1"),
            delete_by_state: concat!("DELETE FROM ", $table, " WHERE status = ?1"),
            delete_row: concat!("DELETE FROM ", $table, " WHERE idx = ?1"),
        }
    };
}

static TELEMETRY: TableSql = table_sql!(
    "telemetry",
    "data_type, name, value, msg, ts, \"desc\", status",
    "?1, ?2, ?3, ?4, ?5, ?6, ?7",
    "idx INTEGER PRIMARY KEY AUTOINCREMENT,
     data_type TEXT,
     name TEXT,
     value REAL,
     msg TEXT,
     ts TEXT,
     \"desc\" TEXT,
     status TEXT"
);

static LOCATION: TableSql = table_sql!(
    "location",
    "data_type, name, latitude, longitude, heading, altitude, speed, accuracy, fix_type, msg, ts, status",
    "?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12",
    "idx INTEGER PRIMARY KEY AUTOINCREMENT,
     data_type TEXT,
     name TEXT,
     latitude REAL,
     longitude REAL,
     heading REAL,
     altitude REAL,
     speed REAL,
     accuracy REAL,
     fix_type TEXT,
     msg TEXT,
     ts TEXT,
     status TEXT"
);

static ALARM: TableSql = table_sql!(
    "alarm",
    "data_type, name, alarm_state, msg, repub, ts, corr_id, lat, lng, \"desc\", status",
    "?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11",
    "idx INTEGER PRIMARY KEY AUTOINCREMENT,
     data_type TEXT,
     name TEXT,
     alarm_state INTEGER,
     msg TEXT,
     repub BOOL,
     ts TEXT,
     corr_id TEXT,
     lat REAL,
     lng REAL,
     \"desc\" TEXT,
     status TEXT"
);

static ATTRIBUTE: TableSql = table_sql!(
    "attribute",
    "data_type, name, value, corr_id, \"desc\", repub, ts, status",
    "?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8",
    "idx INTEGER PRIMARY KEY AUTOINCREMENT,
     data_type TEXT,
     name TEXT,
     value TEXT,
     corr_id TEXT,
     \"desc\" TEXT,
     repub BOOL,
     ts TEXT,
     status TEXT"
);

/// Statements for the table backing `kind`
pub(crate) fn sql(kind: RecordKind) -> &'static TableSql {
    match kind {
        RecordKind::Telemetry => &TELEMETRY,
        RecordKind::Location => &LOCATION,
        RecordKind::Alarm => &ALARM,
        RecordKind::Attribute => &ATTRIBUTE,
    }
}

/// Create all tables that do not exist yet
pub(crate) fn create_all(conn: &Connection) -> rusqlite::Result<()> {
    for kind in RecordKind::ALL {
        conn.execute_batch(sql(kind).create)?;
    }
    Ok(())
}

/// Insert one record. `ts` is already in storage format.
pub(crate) fn insert_record(
    conn: &Connection,
    record: &Record,
    ts: &str,
    state: State,
) -> rusqlite::Result<usize> {
    let kind = record.kind();
    let data_type = kind.table_name();
    let status = state.as_str();
    let insert = sql(kind).insert;

    match record {
        Record::Telemetry(t) => conn.execute(
            insert,
            params![data_type, t.name, t.value, t.message, ts, t.description, status],
        ),
        Record::Location(l) => conn.execute(
            insert,
            params![
                data_type,
                l.name,
                l.latitude,
                l.longitude,
                l.heading,
                l.altitude,
                l.speed,
                l.accuracy,
                l.fix_type,
                l.message,
                ts,
                status
            ],
        ),
        Record::Alarm(a) => conn.execute(
            insert,
            params![
                data_type,
                a.name,
                a.state,
                a.message,
                a.republish,
                ts,
                a.correlation_id,
                a.latitude,
                a.longitude,
                a.description,
                status
            ],
        ),
        Record::Attribute(a) => conn.execute(
            insert,
            params![
                data_type,
                a.name,
                a.value,
                a.correlation_id,
                a.description,
                a.republish,
                ts,
                status
            ],
        ),
    }
}

fn conversion_error(row: &rusqlite::Row<'_>, column: &str, err: RegistryError) -> rusqlite::Error {
    let idx = row.as_ref().column_index(column).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn name(row: &rusqlite::Row<'_>) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>("name")?.unwrap_or_default())
}

/// Map a row selected with `select_*` back into a typed row
pub(crate) fn read_row(kind: RecordKind, row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let index: i64 = row.get("idx")?;
    let ts: String = row.get("ts")?;
    let status: String = row.get("status")?;

    let timestamp = parse_timestamp(&ts).map_err(|e| conversion_error(row, "ts", e))?;
    let state = status
        .parse::<State>()
        .map_err(|e| conversion_error(row, "status", e))?;

    let record = match kind {
        RecordKind::Telemetry => Record::Telemetry(Telemetry {
            name: name(row)?,
            value: row.get("value")?,
            message: row.get("msg")?,
            description: row.get("desc")?,
        }),
        RecordKind::Location => Record::Location(Location {
            name: name(row)?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            heading: row.get("heading")?,
            altitude: row.get("altitude")?,
            speed: row.get("speed")?,
            accuracy: row.get("accuracy")?,
            fix_type: row.get("fix_type")?,
            message: row.get("msg")?,
        }),
        RecordKind::Alarm => Record::Alarm(Alarm {
            name: name(row)?,
            state: row.get::<_, Option<i64>>("alarm_state")?.unwrap_or_default(),
            message: row.get("msg")?,
            republish: row.get::<_, Option<bool>>("repub")?.unwrap_or(false),
            correlation_id: row.get("corr_id")?,
            latitude: row.get("lat")?,
            longitude: row.get("lng")?,
            description: row.get("desc")?,
        }),
        RecordKind::Attribute => Record::Attribute(Attribute {
            name: name(row)?,
            value: row.get::<_, Option<String>>("value")?.unwrap_or_default(),
            correlation_id: row.get("corr_id")?,
            description: row.get("desc")?,
            republish: row.get::<_, Option<bool>>("repub")?.unwrap_or(false),
        }),
    };

    Ok(Row {
        index,
        timestamp,
        state,
        record,
    })
}

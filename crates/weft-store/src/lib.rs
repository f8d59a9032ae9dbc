//! SQLite persistence for activation snapshots and the analytics read over them.

pub mod schema;

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use tracing::info;
use weft_types::{
    analytics::{fill_hours, AnalyticsOverview, IndexCount, NfcStats, TextureCount},
    record::{EventQuery, NewNfcEvent, NfcEvent, StoredEvent},
    Result, WeftError,
};

const EVENT_COLUMNS: &str = "id, timestamp, nfc_index, texture_name, snapshot_data, created_at";

/// Shared handle to the event database. Cloning shares the connection.
#[derive(Clone)]
pub struct EventStore {
    conn: Arc<Mutex<Connection>>,
}

impl EventStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        weft_ops::ensure_parent_dir(path)?;
        let conn = Connection::open(path)
            .map_err(|err| storage_error(format!("failed to open {}: {err}", path.display())))?;
        info!("Event database ready at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|err| storage_error(format!("failed to open in-memory db: {err}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::initialize_schema(&conn)
            .map_err(|err| storage_error(format!("schema migration failed: {err}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        what: &str,
        op: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| storage_error("failed to lock database connection"))?;
        op(&conn).map_err(|err| storage_error(format!("{what} failed: {err}")))
    }

    pub fn insert(&self, record: &NewNfcEvent) -> Result<StoredEvent> {
        let created_at = format_timestamp(Utc::now());
        let id = self.with_conn("insert", |conn| {
            conn.execute(
                "INSERT INTO nfc_events
                    (timestamp, nfc_index, texture_name, snapshot_data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    format_timestamp(record.timestamp),
                    record.nfc_index,
                    record.texture_name.as_deref(),
                    record.snapshot_data,
                    created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(StoredEvent {
            id,
            size: record.size(),
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<NfcEvent>> {
        self.with_conn("get", |conn| {
            conn.query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM nfc_events WHERE id = ?1"),
                params![id],
                event_from_row,
            )
            .optional()
        })
    }

    /// Most recent first by event time, newest insert breaking ties.
    pub fn list(&self, query: EventQuery) -> Result<Vec<NfcEvent>> {
        let limit = query.limit as i64;
        self.with_conn("list", |conn| match query.nfc_index {
            Some(index) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM nfc_events WHERE nfc_index = ?1
                     ORDER BY timestamp DESC, id DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![index, limit], event_from_row)?;
                rows.collect()
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM nfc_events
                     ORDER BY timestamp DESC, id DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit], event_from_row)?;
                rows.collect()
            }
        })
    }

    pub fn count(&self) -> Result<u64> {
        self.with_conn("count", |conn| {
            conn.query_row("SELECT COUNT(*) FROM nfc_events", [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .map(|n| n as u64)
    }

    /// Operator-only wipe of the history. Returns the number of removed rows.
    pub fn purge(&self) -> Result<usize> {
        let removed = self.with_conn("purge", |conn| conn.execute("DELETE FROM nfc_events", []))?;
        info!("Purged {removed} stored events");
        Ok(removed)
    }

    pub fn overview(&self) -> Result<AnalyticsOverview> {
        self.with_conn("overview", |conn| {
            let (total, distinct_indices, distinct_textures, bytes, first, last) = conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT nfc_index), COUNT(DISTINCT texture_name),
                        COALESCE(SUM(LENGTH(snapshot_data)), 0), MIN(timestamp), MAX(timestamp)
                 FROM nfc_events",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? as u64,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                        row.get::<_, i64>(3)? as u64,
                        optional_timestamp(row, 4)?,
                        optional_timestamp(row, 5)?,
                    ))
                },
            )?;

            let mut stmt = conn.prepare(
                "SELECT nfc_index, COUNT(*) FROM nfc_events GROUP BY nfc_index ORDER BY nfc_index",
            )?;
            let per_index = stmt
                .query_map([], |row| {
                    Ok(IndexCount {
                        nfc_index: row.get(0)?,
                        count: row.get::<_, i64>(1)? as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let hourly = hour_rows(conn, None)?;

            Ok(AnalyticsOverview {
                total_events: total,
                distinct_indices,
                distinct_textures,
                total_snapshot_bytes: bytes,
                average_snapshot_bytes: if total == 0 {
                    0.0
                } else {
                    bytes as f64 / total as f64
                },
                first_event: first,
                last_event: last,
                per_index,
                hourly: fill_hours(hourly),
            })
        })
    }

    pub fn nfc_stats(&self, nfc_index: i64) -> Result<NfcStats> {
        self.with_conn("nfc stats", |conn| {
            let (total, distinct_textures, bytes, first, last) = conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT texture_name),
                        COALESCE(SUM(LENGTH(snapshot_data)), 0), MIN(timestamp), MAX(timestamp)
                 FROM nfc_events WHERE nfc_index = ?1",
                params![nfc_index],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? as u64,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                        optional_timestamp(row, 3)?,
                        optional_timestamp(row, 4)?,
                    ))
                },
            )?;

            let mut stmt = conn.prepare(
                "SELECT texture_name, COUNT(*) AS n FROM nfc_events WHERE nfc_index = ?1
                 GROUP BY texture_name ORDER BY n DESC, texture_name",
            )?;
            let textures = stmt
                .query_map(params![nfc_index], |row| {
                    Ok(TextureCount {
                        texture_name: row.get(0)?,
                        count: row.get::<_, i64>(1)? as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let hourly = hour_rows(conn, Some(nfc_index))?;

            Ok(NfcStats {
                nfc_index,
                total_events: total,
                distinct_textures,
                total_snapshot_bytes: bytes,
                first_seen: first,
                last_seen: last,
                textures,
                hourly: fill_hours(hourly),
            })
        })
    }
}

fn hour_rows(conn: &Connection, nfc_index: Option<i64>) -> rusqlite::Result<Vec<(u8, u64)>> {
    let map_row = |row: &Row<'_>| -> rusqlite::Result<(u8, u64)> {
        Ok((row.get::<_, i64>(0)? as u8, row.get::<_, i64>(1)? as u64))
    };
    let base = "SELECT CAST(strftime('%H', timestamp) AS INTEGER) AS hour, COUNT(*)
                FROM nfc_events WHERE strftime('%H', timestamp) IS NOT NULL";
    match nfc_index {
        Some(index) => {
            let mut stmt = conn.prepare(&format!("{base} AND nfc_index = ?1 GROUP BY hour"))?;
            let rows = stmt.query_map(params![index], map_row)?;
            rows.collect()
        }
        None => {
            let mut stmt = conn.prepare(&format!("{base} GROUP BY hour"))?;
            let rows = stmt.query_map([], map_row)?;
            rows.collect()
        }
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<NfcEvent> {
    Ok(NfcEvent {
        id: row.get(0)?,
        timestamp: parse_timestamp(row, 1)?,
        nfc_index: row.get(2)?,
        texture_name: row.get(3)?,
        snapshot_data: row.get(4)?,
        created_at: parse_timestamp(row, 5)?,
    })
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(_) => parse_timestamp(row, idx).map(Some),
    }
}

/// Millisecond UTC with a `Z` suffix, so text order is time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn storage_error(message: impl Into<String>) -> WeftError {
    WeftError::Storage(message.into())
}

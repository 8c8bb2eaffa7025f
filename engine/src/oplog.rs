//! Oplog writer and readers.
//!
//! The oplog is append-only: entries are immutable once written and no row
//! is ever updated or removed. The writer allocates ids and timestamps; the
//! readers expose the orderings the rest of the engine needs - global
//! effective order, per-task history, and per-device after the push
//! high-water mark.

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use crate::clock;
use crate::error::Result;
use crate::ids::IdGen;
use crate::op::{Change, OpType, OplogEntry};

/// Append a single operation atomically and return the persisted entry.
///
/// Allocates a fresh UUIDv7 id and stamps the current UTC time unless the
/// caller supplies one. Runs against whatever connection it is handed -
/// callers that also materialize the op pass the surrounding transaction.
/// Semantic validation of `value` is replay's job, not the writer's.
pub fn append(
    conn: &Connection,
    ids: &IdGen,
    device_id: &str,
    task_id: &str,
    change: &Change,
    timestamp: Option<String>,
) -> Result<OplogEntry> {
    let entry = OplogEntry::new(
        ids.generate(),
        task_id,
        device_id,
        change,
        timestamp.unwrap_or_else(clock::now_ms),
    )?;
    insert(conn, &entry)?;
    Ok(entry)
}

/// Insert entries that already carry ids, ignoring ones the log has seen.
/// Returns how many were new. This is the sync ingest path; at-least-once
/// delivery makes duplicates routine.
pub fn ingest(conn: &Connection, entries: &[OplogEntry]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO oplog (id, task_id, device_id, op_type, field, value, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let mut fresh = 0;
    for entry in entries {
        fresh += stmt.execute(params![
            entry.id,
            entry.task_id,
            entry.device_id,
            entry.op_type.as_str(),
            entry.field,
            entry.value,
            entry.timestamp,
        ])?;
    }
    Ok(fresh)
}

fn insert(conn: &Connection, entry: &OplogEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO oplog (id, task_id, device_id, op_type, field, value, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.id,
            entry.task_id,
            entry.device_id,
            entry.op_type.as_str(),
            entry.field,
            entry.value,
            entry.timestamp,
        ],
    )?;
    Ok(())
}

const ENTRY_COLUMNS: &str = "id, task_id, device_id, op_type, field, value, timestamp";

pub(crate) fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<OplogEntry> {
    let op_type: String = row.get(3)?;
    Ok(OplogEntry {
        id: row.get(0)?,
        task_id: row.get(1)?,
        device_id: row.get(2)?,
        op_type: OpType::from_str(&op_type).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
        })?,
        field: row.get(4)?,
        value: row.get(5)?,
        timestamp: row.get(6)?,
    })
}

/// The whole log in effective order: `timestamp` first, `id` breaking ties.
pub fn all_sorted(conn: &Connection) -> Result<Vec<OplogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM oplog ORDER BY timestamp ASC, id ASC"
    ))?;
    let entries = stmt
        .query_map([], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// One task's full history in effective order.
pub fn for_task(conn: &Connection, task_id: &str) -> Result<Vec<OplogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM oplog
         WHERE task_id = ?1 ORDER BY timestamp ASC, id ASC"
    ))?;
    let entries = stmt
        .query_map([task_id], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Entries originated by `device_id` with ids past `after`, in id order.
/// UUIDv7 ordering substitutes for a sequence counter, so this is exactly
/// "everything not yet pushed".
pub fn for_device_after(
    conn: &Connection,
    device_id: &str,
    after: Option<&str>,
) -> Result<Vec<OplogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM oplog
         WHERE device_id = ?1 AND id > ?2 ORDER BY id ASC"
    ))?;
    let entries = stmt
        .query_map([device_id, after.unwrap_or("")], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Total number of entries in the log.
pub fn len(conn: &Connection) -> Result<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM oplog", [], |row| row.get(0))?;
    Ok(n as usize)
}

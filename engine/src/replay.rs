//! Task materialization: the deterministic fold of the oplog into the
//! tasks table.
//!
//! Conflict resolution is last-writer-wins at field granularity. The gate
//! compares `(op.timestamp, op.id)` against the row's
//! `(updated_at, last_op_id)`; an op at or below the row's position is
//! dropped. Because the comparison includes the id, re-applying an
//! already-applied entry is a strict no-op, which is what makes replay
//! idempotent even for append-semantics fields like notes.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::error::{Error, Result};
use crate::op::{Change, CreatePayload, FieldChange, OplogEntry};
use crate::oplog;
use crate::task::{Priority, Status};

/// Where the row currently sits in the effective order.
struct RowHead {
    updated_at: String,
    last_op_id: String,
}

fn row_head(conn: &Connection, task_id: &str) -> Result<Option<RowHead>> {
    let head = conn
        .query_row(
            "SELECT updated_at, last_op_id FROM tasks WHERE id = ?1",
            [task_id],
            |row| {
                Ok(RowHead {
                    updated_at: row.get(0)?,
                    last_op_id: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(head)
}

/// Apply one entry to the tasks table. Returns whether the row changed.
///
/// Decode failures surface as errors here; batch [`replay`] downgrades them
/// to a warning and skips the entry. Callers applying a just-written op
/// (the Task Service) never hit that path.
pub fn apply(conn: &Connection, entry: &OplogEntry) -> Result<bool> {
    match Change::decode(entry)? {
        Change::Create(payload) => apply_create(conn, entry, &payload),
        Change::Update(change) => apply_update(conn, entry, &change),
        Change::Delete => apply_delete(conn, entry),
    }
}

fn apply_create(conn: &Connection, entry: &OplogEntry, payload: &CreatePayload) -> Result<bool> {
    // A row that already exists wins: creates are idempotent under
    // duplicate delivery, and the first create in effective order is the
    // one a sorted replay sees first.
    if row_head(conn, &entry.task_id)?.is_some() {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO tasks
             (id, title, status, priority, labels, notes, metadata,
              due_at, created_at, updated_at, deleted_at, last_op_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, ?11)",
        params![
            entry.task_id,
            payload.title,
            payload.status.unwrap_or(Status::Todo).as_str(),
            payload.priority.unwrap_or(Priority::Medium).as_str(),
            serde_json::to_string(&payload.labels)?,
            serde_json::to_string(&payload.notes)?,
            serde_json::to_string(&payload.metadata)?,
            payload.due_at,
            entry.timestamp,
            entry.timestamp,
            entry.id,
        ],
    )?;
    Ok(true)
}

fn apply_update(conn: &Connection, entry: &OplogEntry, change: &FieldChange) -> Result<bool> {
    // No row: the create has not been applied. A sorted replay would have
    // seen it first, so this op belongs to an out-of-order delivery and is
    // dropped; the pull path rebuilds the task from its full history.
    let Some(head) = row_head(conn, &entry.task_id)? else {
        return Ok(false);
    };
    if !wins(entry, &head) {
        return Ok(false);
    }

    match change {
        FieldChange::Title(title) => {
            set_column(conn, entry, "title", Some(title.as_str()))?;
        }
        FieldChange::Status(status) => {
            set_column(conn, entry, "status", Some(status.as_str()))?;
        }
        FieldChange::Priority(priority) => {
            set_column(conn, entry, "priority", Some(priority.as_str()))?;
        }
        FieldChange::Labels(labels) => {
            let encoded = serde_json::to_string(labels)?;
            set_column(conn, entry, "labels", Some(encoded.as_str()))?;
        }
        FieldChange::NoteAppended(note) => {
            let mut notes: Vec<String> = read_json_column(conn, &entry.task_id, "notes")?;
            notes.push(note.clone());
            let encoded = serde_json::to_string(&notes)?;
            set_column(conn, entry, "notes", Some(encoded.as_str()))?;
        }
        FieldChange::DueAt(due) => {
            set_column(conn, entry, "due_at", due.as_deref())?;
        }
        FieldChange::Metadata(patch) => {
            let mut metadata: BTreeMap<String, String> =
                read_json_column(conn, &entry.task_id, "metadata")?;
            for (key, value) in patch {
                match value {
                    Some(v) => {
                        metadata.insert(key.clone(), v.clone());
                    }
                    None => {
                        metadata.remove(key);
                    }
                }
            }
            let encoded = serde_json::to_string(&metadata)?;
            set_column(conn, entry, "metadata", Some(encoded.as_str()))?;
        }
    }
    Ok(true)
}

fn apply_delete(conn: &Connection, entry: &OplogEntry) -> Result<bool> {
    let Some(head) = row_head(conn, &entry.task_id)? else {
        return Ok(false);
    };
    if !wins(entry, &head) {
        return Ok(false);
    }

    conn.execute(
        "UPDATE tasks SET deleted_at = ?1, updated_at = ?1, last_op_id = ?2 WHERE id = ?3",
        params![entry.timestamp, entry.id, entry.task_id],
    )?;
    Ok(true)
}

/// The LWW gate: strictly past the row's `(updated_at, last_op_id)`.
fn wins(entry: &OplogEntry, head: &RowHead) -> bool {
    (entry.timestamp.as_str(), entry.id.as_str())
        > (head.updated_at.as_str(), head.last_op_id.as_str())
}

fn set_column(
    conn: &Connection,
    entry: &OplogEntry,
    column: &str,
    value: Option<&str>,
) -> Result<()> {
    // `column` is a fixed name chosen by the FieldChange match above,
    // never caller input.
    conn.execute(
        &format!(
            "UPDATE tasks SET {column} = ?1, updated_at = ?2, last_op_id = ?3 WHERE id = ?4"
        ),
        params![value, entry.timestamp, entry.id, entry.task_id],
    )?;
    Ok(())
}

fn read_json_column<T: serde::de::DeserializeOwned>(
    conn: &Connection,
    task_id: &str,
    column: &str,
) -> Result<T> {
    let raw: String = conn.query_row(
        &format!("SELECT {column} FROM tasks WHERE id = ?1"),
        [task_id],
        |row| row.get(0),
    )?;
    Ok(serde_json::from_str(&raw)?)
}

/// Apply a batch in its given order. Corrupt entries are logged and
/// skipped; storage failures abort. Returns how many entries changed a row.
pub fn replay(conn: &Connection, entries: &[OplogEntry]) -> Result<usize> {
    let mut applied = 0;
    for entry in entries {
        match apply(conn, entry) {
            Ok(changed) => applied += usize::from(changed),
            Err(err @ (Error::Encoding(_) | Error::Constraint { .. })) => {
                warn!(entry = %entry.id, task = %entry.task_id, %err, "skipping corrupt oplog entry");
            }
            Err(other) => return Err(other),
        }
    }
    Ok(applied)
}

/// Truncate the tasks table and refold the entire log in effective order.
pub fn rebuild(conn: &Connection) -> Result<usize> {
    conn.execute("DELETE FROM tasks", [])?;
    let entries = oplog::all_sorted(conn)?;
    replay(conn, &entries)
}

/// Refold only the named tasks from their full histories. Used by sync
/// pull, where an out-of-order arrival can invalidate the incremental
/// state of exactly those tasks.
pub fn rebuild_tasks<'a>(
    conn: &Connection,
    task_ids: impl IntoIterator<Item = &'a str>,
) -> Result<usize> {
    let mut applied = 0;
    let mut seen = BTreeSet::new();
    for task_id in task_ids {
        if !seen.insert(task_id) {
            continue;
        }
        conn.execute("DELETE FROM tasks WHERE id = ?1", [task_id])?;
        let history = oplog::for_task(conn, task_id)?;
        applied += replay(conn, &history)?;
    }
    Ok(applied)
}

//! The materialized task row model.
//!
//! A `Task` is a cache entry: every field is reproducible by replaying the
//! oplog subset with this task's id. The JSON columns (`labels`, `notes`,
//! `metadata`) are a storage encoding only - in memory they are a set, a
//! sequence, and a map, all with deterministic ordering so a rebuild writes
//! byte-identical rows.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::TaskId;

/// Workflow state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Todo,
    InProgress,
    Done,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in_progress",
            Status::Done => "done",
        }
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "todo" => Ok(Status::Todo),
            "in_progress" => Ok(Status::InProgress),
            "done" => Ok(Status::Done),
            other => Err(Error::constraint("status", format!("unknown status '{other}'"))),
        }
    }
}

/// Priority of a task, most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Urgent,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(Error::constraint(
                "priority",
                format!("unknown priority '{other}'"),
            )),
        }
    }
}

/// A user-visible unit of work, as materialized from the oplog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub status: Status,
    pub priority: Priority,
    pub labels: BTreeSet<String>,
    pub notes: Vec<String>,
    pub due_at: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// Timestamp of the task's create op. Immutable after.
    pub created_at: String,
    /// Timestamp of the most recent op applied to this task.
    pub updated_at: String,
    /// Tombstone. Once set the task is hidden from default queries.
    pub deleted_at: Option<String>,
}

impl Task {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Column list matching [`Task::from_row`]. Keep the two in sync.
pub(crate) const TASK_COLUMNS: &str =
    "id, title, status, priority, labels, notes, metadata, due_at, created_at, updated_at, deleted_at";

impl Task {
    /// Map a row selected with [`TASK_COLUMNS`] into a `Task`.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
        let status: String = row.get(2)?;
        let priority: String = row.get(3)?;
        let labels: String = row.get(4)?;
        let notes: String = row.get(5)?;
        let metadata: String = row.get(6)?;

        Ok(Task {
            id: row.get(0)?,
            title: row.get(1)?,
            status: Status::from_str(&status)
                .map_err(|e| conversion_error(2, e))?,
            priority: Priority::from_str(&priority)
                .map_err(|e| conversion_error(3, e))?,
            labels: serde_json::from_str(&labels).map_err(|e| conversion_error(4, e))?,
            notes: serde_json::from_str(&notes).map_err(|e| conversion_error(5, e))?,
            metadata: serde_json::from_str(&metadata).map_err(|e| conversion_error(6, e))?,
            due_at: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            deleted_at: row.get(10)?,
        })
    }
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

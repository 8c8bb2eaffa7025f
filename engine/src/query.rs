//! Read-only, SQL-level filters over the materialized tasks table.
//!
//! Tombstoned tasks are excluded unless the filter opts in. The default
//! sort is status, then priority (urgent first), then due date with nulls
//! last, then creation order.

use std::collections::BTreeMap;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params_from_iter, Connection};

use crate::clock;
use crate::error::Result;
use crate::task::{Priority, Status, Task, TASK_COLUMNS};

/// A due-date window, evaluated against local time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueWindow {
    /// Due strictly before now.
    Overdue,
    /// Due any time today.
    Today,
    /// Due within the next seven days, today included.
    ThisWeek,
    /// Due before the given `YYYY-MM-DDTHH:MM:SS` instant.
    Before(String),
    /// Due after the given `YYYY-MM-DDTHH:MM:SS` instant.
    After(String),
}

/// Filter for [`crate::TaskService::list`]. Empty means "everything not
/// deleted".
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Vec<Status>,
    pub priority: Vec<Priority>,
    pub label: Option<String>,
    pub due: Option<DueWindow>,
    pub text: Option<String>,
    pub include_deleted: bool,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status.push(status);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority.push(priority);
        self
    }

    /// Only tasks carrying this label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn due(mut self, window: DueWindow) -> Self {
        self.due = Some(window);
        self
    }

    /// Case-insensitive substring match on the title.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

pub(crate) fn select(conn: &Connection, filter: &TaskFilter) -> Result<Vec<Task>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<String> = Vec::new();

    if !filter.include_deleted {
        clauses.push("deleted_at IS NULL".into());
    }
    if !filter.status.is_empty() {
        clauses.push(format!("status IN ({})", marks(filter.status.len())));
        params.extend(filter.status.iter().map(|s| s.as_str().to_string()));
    }
    if !filter.priority.is_empty() {
        clauses.push(format!("priority IN ({})", marks(filter.priority.len())));
        params.extend(filter.priority.iter().map(|p| p.as_str().to_string()));
    }
    if let Some(label) = &filter.label {
        clauses.push(
            "EXISTS (SELECT 1 FROM json_each(tasks.labels) WHERE json_each.value = ?)".into(),
        );
        params.push(label.clone());
    }
    if let Some(text) = &filter.text {
        clauses.push("instr(lower(title), lower(?)) > 0".into());
        params.push(text.clone());
    }
    match &filter.due {
        None => {}
        Some(DueWindow::Overdue) => {
            clauses.push("due_at IS NOT NULL AND due_at < ?".into());
            params.push(clock::local_now());
        }
        Some(DueWindow::Today) => {
            clauses.push("due_at IS NOT NULL AND due_at >= ? AND due_at < ?".into());
            params.push(clock::local_day_start(0));
            params.push(clock::local_day_start(1));
        }
        Some(DueWindow::ThisWeek) => {
            clauses.push("due_at IS NOT NULL AND due_at >= ? AND due_at < ?".into());
            params.push(clock::local_day_start(0));
            params.push(clock::local_day_start(7));
        }
        Some(DueWindow::Before(t)) => {
            clauses.push("due_at IS NOT NULL AND due_at < ?".into());
            params.push(t.clone());
        }
        Some(DueWindow::After(t)) => {
            clauses.push("due_at IS NOT NULL AND due_at > ?".into());
            params.push(t.clone());
        }
    }

    let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(
        " ORDER BY
            CASE status WHEN 'todo' THEN 0 WHEN 'in_progress' THEN 1 ELSE 2 END,
            CASE priority WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END,
            due_at IS NULL, due_at,
            created_at",
    );

    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(params_from_iter(params.iter()), Task::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

fn marks(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Unique labels across non-tombstoned tasks, sorted.
pub(crate) fn labels(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT json_each.value
         FROM tasks, json_each(tasks.labels)
         WHERE tasks.deleted_at IS NULL
         ORDER BY json_each.value",
    )?;
    let labels = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(labels)
}

/// Live task counts keyed by status.
pub(crate) fn status_counts(conn: &Connection) -> Result<BTreeMap<Status, usize>> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM tasks WHERE deleted_at IS NULL GROUP BY status",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            let status = Status::from_str(&status).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
            })?;
            Ok((status, count as usize))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows.into_iter().collect())
}

//! The Task Service - the high-level operation API.
//!
//! Everything outside the core (CLI, HTTP API, MCP, mobile) creates, reads,
//! mutates, and queries tasks solely through this type. Every writing
//! operation appends to the oplog and materializes the result inside a
//! single transaction: either both happen or neither does.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::OptionalExtension;
use serde::Serialize;

use crate::clock;
use crate::device;
use crate::error::{Error, Result};
use crate::ids::IdGen;
use crate::op::{Change, CreatePayload, FieldChange};
use crate::oplog;
use crate::query::{self, DueWindow, TaskFilter};
use crate::replay;
use crate::store::Store;
use crate::task::{Priority, Status, Task, TASK_COLUMNS};

/// Input for [`TaskService::create`]. Only the title is required.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub labels: BTreeSet<String>,
    pub notes: Vec<String>,
    pub due_at: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Fields to change in [`TaskService::update`]. `None` leaves a field
/// untouched; `due_at: Some(None)` clears the due date. Notes are not
/// patched here - they append through [`TaskService::add_note`].
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub labels: Option<BTreeSet<String>>,
    pub due_at: Option<Option<String>>,
    /// Keys merged into the metadata map; `None` removes the key.
    pub metadata: Option<BTreeMap<String, Option<String>>>,
}

impl TaskPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn labels(mut self, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn due_at(mut self, due: Option<String>) -> Self {
        self.due_at = Some(due);
        self
    }

    pub fn metadata(mut self, patch: BTreeMap<String, Option<String>>) -> Self {
        self.metadata = Some(patch);
        self
    }

    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.labels.is_none()
            && self.due_at.is_none()
            && self.metadata.is_none()
    }
}

/// Dashboard summary returned by [`TaskService::context`].
#[derive(Debug, Clone, Serialize)]
pub struct ContextSummary {
    pub todo_count: usize,
    pub in_progress_count: usize,
    pub done_count: usize,
    pub overdue: Vec<Task>,
    pub due_today: Vec<Task>,
    pub in_progress: Vec<Task>,
}

/// High-level task operations over a [`Store`].
pub struct TaskService {
    store: Store,
    ids: IdGen,
    device_id: String,
}

impl TaskService {
    /// Wrap an opened store, resolving this replica's device identity.
    pub fn new(store: Store) -> Result<Self> {
        let device_id = device::get_device_id(store.conn())?;
        Ok(Self {
            store,
            ids: IdGen::new(),
            device_id,
        })
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::new(Store::open(path)?)
    }

    /// Open at `$ORU_DB_PATH` / `$HOME/.oru/oru.db`.
    pub fn open_default() -> Result<Self> {
        Self::new(Store::open_default()?)
    }

    /// In-memory service, for tests and examples.
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Store::open_in_memory()?)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Mutable store access, used to hand the handle to the sync engine.
    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// Create a task and return its materialized row.
    pub fn create(&mut self, new: NewTask) -> Result<Task> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(Error::constraint("title", "must not be empty"));
        }
        let labels = clean_labels(new.labels)?;
        for note in &new.notes {
            if note.trim().is_empty() {
                return Err(Error::constraint("notes", "notes must not be empty"));
            }
        }
        if let Some(due) = &new.due_at {
            check_due(due)?;
        }

        let task_id = self.ids.generate();
        let change = Change::Create(CreatePayload {
            title: title.to_string(),
            status: new.status,
            priority: new.priority,
            labels,
            notes: new.notes,
            due_at: new.due_at,
            metadata: new.metadata,
        });

        let tx = self.store.transaction()?;
        let entry = oplog::append(&tx, &self.ids, &self.device_id, &task_id, &change, None)?;
        replay::apply(&tx, &entry)?;
        tx.commit()?;

        self.get(&task_id)
    }

    /// Apply a partial update: one oplog entry per changed field, all in
    /// one transaction.
    pub fn update(&mut self, id: &str, patch: TaskPatch) -> Result<Task> {
        if patch.is_empty() {
            return Err(Error::constraint("update", "no fields to change"));
        }
        self.get(id)?;

        let mut changes = Vec::new();
        if let Some(title) = patch.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(Error::constraint("title", "must not be empty"));
            }
            changes.push(FieldChange::Title(title));
        }
        if let Some(status) = patch.status {
            changes.push(FieldChange::Status(status));
        }
        if let Some(priority) = patch.priority {
            changes.push(FieldChange::Priority(priority));
        }
        if let Some(labels) = patch.labels {
            changes.push(FieldChange::Labels(clean_labels(labels)?));
        }
        if let Some(due) = patch.due_at {
            if let Some(d) = &due {
                check_due(d)?;
            }
            changes.push(FieldChange::DueAt(due));
        }
        if let Some(metadata) = patch.metadata {
            changes.push(FieldChange::Metadata(metadata));
        }

        let tx = self.store.transaction()?;
        for change in changes {
            let entry = oplog::append(
                &tx,
                &self.ids,
                &self.device_id,
                id,
                &Change::Update(change),
                None,
            )?;
            replay::apply(&tx, &entry)?;
        }
        tx.commit()?;

        self.get(id)
    }

    /// Tombstone a task. The row is hidden from default queries but never
    /// physically removed.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        self.get(id)?;
        let tx = self.store.transaction()?;
        let entry = oplog::append(&tx, &self.ids, &self.device_id, id, &Change::Delete, None)?;
        replay::apply(&tx, &entry)?;
        tx.commit()?;
        Ok(())
    }

    /// Fetch a task by id, tombstoned or not.
    pub fn get(&self, id: &str) -> Result<Task> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                [id],
                Task::from_row,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        query::select(self.store.conn(), filter)
    }

    /// Append one note to a task.
    pub fn add_note(&mut self, id: &str, text: &str) -> Result<Task> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::constraint("notes", "note must not be empty"));
        }
        self.get(id)?;

        let tx = self.store.transaction()?;
        let entry = oplog::append(
            &tx,
            &self.ids,
            &self.device_id,
            id,
            &Change::Update(FieldChange::NoteAppended(text.to_string())),
            None,
        )?;
        replay::apply(&tx, &entry)?;
        tx.commit()?;

        self.get(id)
    }

    /// Unique labels across non-tombstoned tasks.
    pub fn list_labels(&self) -> Result<Vec<String>> {
        query::labels(self.store.conn())
    }

    /// Dashboard summary: counts by status, overdue tasks, tasks due
    /// today, and what is in progress.
    pub fn context(&self) -> Result<ContextSummary> {
        let counts = query::status_counts(self.store.conn())?;
        let overdue = self.list(
            &TaskFilter::new()
                .status(Status::Todo)
                .status(Status::InProgress)
                .due(DueWindow::Overdue),
        )?;
        let due_today = self.list(&TaskFilter::new().due(DueWindow::Today))?;
        let in_progress = self.list(&TaskFilter::new().status(Status::InProgress))?;

        Ok(ContextSummary {
            todo_count: counts.get(&Status::Todo).copied().unwrap_or(0),
            in_progress_count: counts.get(&Status::InProgress).copied().unwrap_or(0),
            done_count: counts.get(&Status::Done).copied().unwrap_or(0),
            overdue,
            due_today,
            in_progress,
        })
    }
}

fn clean_labels(labels: BTreeSet<String>) -> Result<BTreeSet<String>> {
    let mut cleaned = BTreeSet::new();
    for label in labels {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::constraint("labels", "labels must not be empty"));
        }
        cleaned.insert(label.to_string());
    }
    Ok(cleaned)
}

fn check_due(due: &str) -> Result<()> {
    clock::check_due(due).ok_or_else(|| {
        Error::constraint(
            "due_at",
            format!("expected YYYY-MM-DDTHH:MM:SS, got '{due}'"),
        )
    })?;
    Ok(())
}

//! Oplog entry types and the decoded operation variants.
//!
//! On disk and on the wire an operation is a flat row: `op_type` plus
//! optional `field`/`value` text columns, kept for portability across
//! implementations. In memory it is a tagged [`Change`] with one variant per
//! mutable field, so replay can match exhaustively instead of dispatching on
//! strings.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task::{Priority, Status};
use crate::{DeviceId, OpId, TaskId};

/// Kind of mutation an oplog entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Create,
    Update,
    Delete,
}

impl OpType {
    pub fn as_str(self) -> &'static str {
        match self {
            OpType::Create => "create",
            OpType::Update => "update",
            OpType::Delete => "delete",
        }
    }
}

impl FromStr for OpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(OpType::Create),
            "update" => Ok(OpType::Update),
            "delete" => Ok(OpType::Delete),
            other => Err(Error::constraint(
                "op_type",
                format!("unknown op type '{other}'"),
            )),
        }
    }
}

/// The unit of the journal. Immutable once appended.
///
/// Field names are the wire format between replicas and must be preserved
/// bit-exactly by every remote backend, so this struct serializes without
/// renames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OplogEntry {
    /// UUIDv7, globally unique, monotone per device.
    pub id: OpId,
    pub task_id: TaskId,
    /// Originating replica.
    pub device_id: DeviceId,
    pub op_type: OpType,
    /// Which task field an update mutates. Null for create/delete.
    pub field: Option<String>,
    /// JSON-encoded new value. Object for create, scalar or JSON for
    /// update, null for delete.
    pub value: Option<String>,
    /// RFC 3339 UTC milliseconds.
    pub timestamp: String,
}

impl OplogEntry {
    /// Build an entry from a decoded change.
    pub fn new(
        id: impl Into<OpId>,
        task_id: impl Into<TaskId>,
        device_id: impl Into<DeviceId>,
        change: &Change,
        timestamp: impl Into<String>,
    ) -> Result<Self> {
        let (field, value) = change.encode()?;
        Ok(Self {
            id: id.into(),
            task_id: task_id.into(),
            device_id: device_id.into(),
            op_type: change.op_type(),
            field,
            value,
            timestamp: timestamp.into(),
        })
    }

    /// Effective oplog ordering key: timestamp first, id breaks ties
    /// deterministically across devices.
    pub fn sort_key(&self) -> (&str, &str) {
        (&self.timestamp, &self.id)
    }
}

impl Ord for OplogEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for OplogEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Payload of a `create` op: the full initial field set.
///
/// Absent fields fall back to their defaults at replay time (`todo`,
/// `medium`, empty containers).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePayload {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// A single-field mutation carried by an `update` op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    Title(String),
    Status(Status),
    Priority(Priority),
    /// Full replacement of the label set.
    Labels(BTreeSet<String>),
    /// One note appended to the sequence.
    NoteAppended(String),
    DueAt(Option<String>),
    /// Keys merged into the metadata map; a null value removes the key.
    Metadata(BTreeMap<String, Option<String>>),
}

impl FieldChange {
    /// Persisted `field` column value.
    pub fn field(&self) -> &'static str {
        match self {
            FieldChange::Title(_) => "title",
            FieldChange::Status(_) => "status",
            FieldChange::Priority(_) => "priority",
            FieldChange::Labels(_) => "labels",
            FieldChange::NoteAppended(_) => "notes",
            FieldChange::DueAt(_) => "due_at",
            FieldChange::Metadata(_) => "metadata",
        }
    }

    fn encode_value(&self) -> Result<String> {
        let v = match self {
            FieldChange::Title(s) => serde_json::to_string(s)?,
            FieldChange::Status(s) => serde_json::to_string(s)?,
            FieldChange::Priority(p) => serde_json::to_string(p)?,
            FieldChange::Labels(l) => serde_json::to_string(l)?,
            FieldChange::NoteAppended(n) => serde_json::to_string(n)?,
            FieldChange::DueAt(d) => serde_json::to_string(d)?,
            FieldChange::Metadata(m) => serde_json::to_string(m)?,
        };
        Ok(v)
    }
}

/// A fully decoded operation, ready for replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Create(CreatePayload),
    Update(FieldChange),
    Delete,
}

impl Change {
    pub fn op_type(&self) -> OpType {
        match self {
            Change::Create(_) => OpType::Create,
            Change::Update(_) => OpType::Update,
            Change::Delete => OpType::Delete,
        }
    }

    /// Persisted `(field, value)` columns for this change.
    pub fn encode(&self) -> Result<(Option<String>, Option<String>)> {
        match self {
            Change::Create(payload) => Ok((None, Some(serde_json::to_string(payload)?))),
            Change::Update(change) => Ok((
                Some(change.field().to_string()),
                Some(change.encode_value()?),
            )),
            Change::Delete => Ok((None, None)),
        }
    }

    /// Decode an entry back into its tagged form.
    ///
    /// Fails on undecodable values; replay treats that as a corrupt entry
    /// and skips it.
    pub fn decode(entry: &OplogEntry) -> Result<Change> {
        match entry.op_type {
            OpType::Create => {
                let value = entry
                    .value
                    .as_deref()
                    .ok_or_else(|| Error::constraint("value", "create op without payload"))?;
                Ok(Change::Create(serde_json::from_str(value)?))
            }
            OpType::Update => {
                let field = entry
                    .field
                    .as_deref()
                    .ok_or_else(|| Error::constraint("field", "update op without field"))?;
                let value = entry
                    .value
                    .as_deref()
                    .ok_or_else(|| Error::constraint("value", "update op without value"))?;
                let change = match field {
                    "title" => FieldChange::Title(serde_json::from_str(value)?),
                    "status" => FieldChange::Status(serde_json::from_str(value)?),
                    "priority" => FieldChange::Priority(serde_json::from_str(value)?),
                    "labels" => FieldChange::Labels(serde_json::from_str(value)?),
                    "notes" => FieldChange::NoteAppended(serde_json::from_str(value)?),
                    "due_at" => FieldChange::DueAt(serde_json::from_str(value)?),
                    "metadata" => FieldChange::Metadata(serde_json::from_str(value)?),
                    other => {
                        return Err(Error::constraint(
                            "field",
                            format!("unknown task field '{other}'"),
                        ))
                    }
                };
                Ok(Change::Update(change))
            }
            OpType::Delete => Ok(Change::Delete),
        }
    }
}

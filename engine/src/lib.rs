//! # Oru Engine
//!
//! The local-first core of the Oru task manager.
//!
//! Durability rests on an append-only operation log (oplog) over an
//! embedded sqlite database, folded deterministically into a queryable
//! tasks table. Any replica can rebuild its entire task state from its
//! oplog alone; a sync engine exchanges oplog entries with other replicas
//! through a pluggable remote backend.
//!
//! ## Core Concepts
//!
//! ### Oplog
//!
//! Every mutation is an [`OplogEntry`]: a UUIDv7 id, the target task, the
//! originating device, and a tagged operation ([`Change`]) - create,
//! single-field update, or delete. Entries are immutable once appended and
//! never removed. Their effective order is `(timestamp, id)`: wall-clock
//! time first, id as the deterministic cross-device tie-breaker.
//!
//! ### Replay
//!
//! The tasks table is a cache. [`replay`] folds entries into it with
//! field-level last-writer-wins semantics; the fold is idempotent and, for
//! sorted input, independent of how entries arrived. `replay::rebuild`
//! reproduces the exact same table from scratch.
//!
//! ### Task Service
//!
//! [`TaskService`] is the one write API. Each writing operation appends to
//! the oplog and materializes the result in a single transaction, so the
//! log and the cache cannot drift.
//!
//! ### Sync
//!
//! [`SyncEngine`] pushes this device's entries past its high-water mark
//! and pulls foreign entries past an opaque cursor, both tracked in the
//! meta table. Push before pull; failures leave both marks untouched and
//! are safe to retry against any idempotent [`Remote`].
//!
//! ## Quick Start
//!
//! ```rust
//! use oru_engine::{NewTask, Status, TaskFilter, TaskPatch, TaskService};
//!
//! let mut tasks = TaskService::open_in_memory().unwrap();
//!
//! let task = tasks.create(NewTask::titled("Buy milk")).unwrap();
//! tasks
//!     .update(&task.id, TaskPatch::new().status(Status::InProgress))
//!     .unwrap();
//! tasks.add_note(&task.id, "oat, not dairy").unwrap();
//!
//! let open = tasks.list(&TaskFilter::new()).unwrap();
//! assert_eq!(open.len(), 1);
//! ```
//!
//! ## Storage
//!
//! One database file at `$ORU_DB_PATH` (or `$HOME/.oru/oru.db`), opened in
//! WAL mode with foreign keys on. Tables: `meta`, `oplog`, `tasks`. The
//! engine is single-threaded with respect to this handle; hosts serialize
//! writes through one [`Store`] and may open separate read-only
//! connections for concurrent queries.

pub mod clock;
pub mod device;
pub mod error;
pub mod ids;
pub mod op;
pub mod oplog;
pub mod query;
pub mod remote;
pub mod replay;
pub mod schema;
pub mod service;
pub mod store;
pub mod sync;
pub mod task;

// Re-export main types at crate root
pub use error::{Error, Result};
pub use ids::IdGen;
pub use op::{Change, CreatePayload, FieldChange, OpType, OplogEntry};
pub use query::{DueWindow, TaskFilter};
pub use remote::fs::FsRemote;
#[cfg(feature = "http-remote")]
pub use remote::http::HttpRemote;
pub use remote::{Remote, RemotePage};
pub use service::{ContextSummary, NewTask, TaskPatch, TaskService};
pub use store::Store;
pub use sync::{SyncEngine, SyncOutcome};
pub use task::{Priority, Status, Task};

/// Type aliases for clarity
pub type TaskId = String;
pub type OpId = String;
pub type DeviceId = String;

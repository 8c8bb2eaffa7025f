//! The remote backend boundary.
//!
//! A remote is anything that can ingest oplog entries idempotently and
//! serve them back in a stable order behind an opaque cursor. The sync
//! engine never looks inside the cursor; it stores whatever the remote
//! returned and hands it back on the next pull.

pub mod fs;
#[cfg(feature = "http-remote")]
pub mod http;

use crate::error::Result;
use crate::op::OplogEntry;

/// One pull's worth of entries plus the position after them.
#[derive(Debug, Clone)]
pub struct RemotePage {
    pub entries: Vec<OplogEntry>,
    /// Position after the last returned entry. `None` when the remote had
    /// nothing new and the caller's cursor still stands.
    pub cursor: Option<String>,
}

/// Transport for oplog exchange between replicas.
pub trait Remote {
    /// Ingest entries with at-least-once semantics. Must deduplicate by
    /// entry id: pushing the same batch twice is harmless.
    fn push(&mut self, entries: &[OplogEntry]) -> Result<()>;

    /// Return all entries strictly after `cursor` in the remote's
    /// canonical order.
    fn pull(&mut self, cursor: Option<&str>) -> Result<RemotePage>;
}

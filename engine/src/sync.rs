//! Bidirectional oplog exchange with a remote backend.
//!
//! State per device, in the meta table: `push_hwm_<deviceId>` is the last
//! oplog id this device pushed, `pull_cursor_<deviceId>` is the remote's
//! opaque position. Neither advances on failure, so a partial sync is
//! always safe to retry: the remote deduplicates pushes by id, the local
//! oplog deduplicates pulls the same way.

use std::collections::BTreeSet;

use tracing::debug;

use crate::device;
use crate::error::Result;
use crate::oplog;
use crate::remote::Remote;
use crate::replay;
use crate::store::{self, Store};

const PUSH_HWM_PREFIX: &str = "push_hwm_";
const PULL_CURSOR_PREFIX: &str = "pull_cursor_";

/// Counts from one sync round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOutcome {
    /// Local entries newly handed to the remote.
    pub pushed: usize,
    /// Fetched entries that originated on other devices.
    pub pulled: usize,
}

/// Push/pull driver over any [`Remote`].
pub struct SyncEngine<R: Remote> {
    remote: R,
}

impl<R: Remote> SyncEngine<R> {
    pub fn new(remote: R) -> Self {
        Self { remote }
    }

    pub fn remote_mut(&mut self) -> &mut R {
        &mut self.remote
    }

    /// Push this device's entries past the high-water mark. Returns how
    /// many went out; the mark advances only after the remote accepted
    /// them.
    pub fn push(&mut self, store: &mut Store) -> Result<usize> {
        let device_id = device::get_device_id(store.conn())?;
        let hwm_key = format!("{PUSH_HWM_PREFIX}{device_id}");
        let hwm = store.meta_get(&hwm_key)?;

        let entries = oplog::for_device_after(store.conn(), &device_id, hwm.as_deref())?;
        if entries.is_empty() {
            return Ok(0);
        }

        self.remote.push(&entries)?;
        if let Some(last) = entries.last() {
            store.meta_put(&hwm_key, &last.id)?;
        }
        debug!(device = %device_id, count = entries.len(), "pushed local entries");
        Ok(entries.len())
    }

    /// Pull everything past the cursor, ingest it, and re-materialize the
    /// affected tasks. Returns the number of foreign entries fetched.
    ///
    /// Out-of-order delivery can surface an update whose create arrives
    /// later, so each affected task is refolded from its full sorted
    /// history instead of applied incrementally. Ingest, rebuild, and the
    /// cursor upsert share one transaction.
    pub fn pull(&mut self, store: &mut Store) -> Result<usize> {
        let device_id = device::get_device_id(store.conn())?;
        let cursor_key = format!("{PULL_CURSOR_PREFIX}{device_id}");
        let cursor = store.meta_get(&cursor_key)?;

        let page = self.remote.pull(cursor.as_deref())?;
        if page.entries.is_empty() {
            return Ok(0);
        }
        let foreign = page
            .entries
            .iter()
            .filter(|e| e.device_id != device_id)
            .count();

        let tx = store.transaction()?;
        oplog::ingest(&tx, &page.entries)?;
        let impacted: BTreeSet<&str> = page.entries.iter().map(|e| e.task_id.as_str()).collect();
        replay::rebuild_tasks(&tx, impacted)?;
        if let Some(cursor) = &page.cursor {
            store::meta_put(&tx, &cursor_key, cursor)?;
        }
        tx.commit()?;

        debug!(device = %device_id, fetched = page.entries.len(), foreign, "pulled remote entries");
        Ok(foreign)
    }

    /// One full round: push, then pull. Push first so a local mutation is
    /// observable remotely without waiting for another round trip.
    pub fn sync(&mut self, store: &mut Store) -> Result<SyncOutcome> {
        let pushed = self.push(store)?;
        let pulled = self.pull(store)?;
        Ok(SyncOutcome { pushed, pulled })
    }
}

//! Reference filesystem remote: a second oplog database.
//!
//! Entries land in a table keyed by a monotone `seq` integer; the pull
//! cursor is the last seq rendered as text. Two replicas pointing at the
//! same file get shared-disk sync; tests get a remote with real semantics
//! and no network.

use std::path::Path;

use rusqlite::{params, Connection, Row};

use super::{Remote, RemotePage};
use crate::error::Result;
use crate::op::OplogEntry;
use crate::oplog;

pub struct FsRemote {
    conn: Connection,
}

impl FsRemote {
    /// Open (or create) the remote database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Private in-memory remote, for single-replica tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS remote_oplog (
                seq       INTEGER PRIMARY KEY AUTOINCREMENT,
                id        TEXT NOT NULL UNIQUE,
                task_id   TEXT NOT NULL,
                device_id TEXT NOT NULL,
                op_type   TEXT NOT NULL,
                field     TEXT,
                value     TEXT,
                timestamp TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }

    /// Entries stored, duplicates excluded.
    pub fn len(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM remote_oplog", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

// seq is selected last so the shared entry mapper sees the usual columns.
fn entry_with_seq(row: &Row<'_>) -> rusqlite::Result<(OplogEntry, i64)> {
    Ok((oplog::entry_from_row(row)?, row.get(7)?))
}

impl Remote for FsRemote {
    fn push(&mut self, entries: &[OplogEntry]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO remote_oplog
                     (id, task_id, device_id, op_type, field, value, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.id,
                    entry.task_id,
                    entry.device_id,
                    entry.op_type.as_str(),
                    entry.field,
                    entry.value,
                    entry.timestamp,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn pull(&mut self, cursor: Option<&str>) -> Result<RemotePage> {
        // An unparsable cursor means "from the beginning"; the worst case
        // is re-delivering entries the local ingest will ignore.
        let since: i64 = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);

        let mut stmt = self.conn.prepare(
            "SELECT id, task_id, device_id, op_type, field, value, timestamp, seq
             FROM remote_oplog WHERE seq > ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map([since], entry_with_seq)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let cursor = rows.last().map(|(_, seq)| seq.to_string());
        let entries = rows.into_iter().map(|(entry, _)| entry).collect();
        Ok(RemotePage { entries, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use crate::op::{Change, CreatePayload};

    fn entry(id: &str, device: &str, unix_ms: i64) -> OplogEntry {
        OplogEntry::new(
            id,
            "t1",
            device,
            &Change::Create(CreatePayload {
                title: "x".into(),
                ..Default::default()
            }),
            clock::from_unix_ms(unix_ms),
        )
        .unwrap()
    }

    #[test]
    fn push_deduplicates_by_id() {
        let mut remote = FsRemote::open_in_memory().unwrap();
        let e = entry("a1", "dev-a", 100);
        remote.push(&[e.clone()]).unwrap();
        remote.push(&[e]).unwrap();
        assert_eq!(remote.len().unwrap(), 1);
    }

    #[test]
    fn pull_advances_cursor_in_seq_order() {
        let mut remote = FsRemote::open_in_memory().unwrap();
        remote.push(&[entry("a1", "dev-a", 100)]).unwrap();
        remote.push(&[entry("a2", "dev-a", 200)]).unwrap();

        let page = remote.pull(None).unwrap();
        assert_eq!(page.entries.len(), 2);
        let cursor = page.cursor.unwrap();

        remote.push(&[entry("a3", "dev-b", 300)]).unwrap();
        let page = remote.pull(Some(&cursor)).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].id, "a3");
        assert!(page.cursor.unwrap() > cursor);
    }

    #[test]
    fn empty_pull_leaves_cursor_unchanged() {
        let mut remote = FsRemote::open_in_memory().unwrap();
        remote.push(&[entry("a1", "dev-a", 100)]).unwrap();
        let cursor = remote.pull(None).unwrap().cursor.unwrap();

        let page = remote.pull(Some(&cursor)).unwrap();
        assert!(page.entries.is_empty());
        assert_eq!(page.cursor, None);
    }

    #[test]
    fn garbage_cursor_reads_from_the_beginning() {
        let mut remote = FsRemote::open_in_memory().unwrap();
        remote.push(&[entry("a1", "dev-a", 100)]).unwrap();
        let page = remote.pull(Some("not-a-seq")).unwrap();
        assert_eq!(page.entries.len(), 1);
    }

    #[test]
    fn entries_survive_the_round_trip_bit_exactly() {
        let mut remote = FsRemote::open_in_memory().unwrap();
        let original = entry("a1", "dev-a", 100);
        remote.push(&[original.clone()]).unwrap();
        let page = remote.pull(None).unwrap();
        assert_eq!(page.entries, vec![original]);
    }
}

//! Store - owns the embedded database handle.
//!
//! All writes serialize through the single connection held here; readers
//! may share it sequentially. The store is opened in WAL mode with foreign
//! keys on, so a write that returns has already survived a process crash.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Transaction};

use crate::error::Result;
use crate::schema;

/// Environment variable overriding the database path. The only variable
/// the engine reads.
pub const ENV_DB_PATH: &str = "ORU_DB_PATH";

/// Handle to the local database: oplog, materialized tasks, and meta.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path` and bring its schema up to
    /// date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open the database at `$ORU_DB_PATH`, or `$HOME/.oru/oru.db`.
    pub fn open_default() -> Result<Self> {
        Self::open(default_db_path())
    }

    /// In-memory store, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // journal_mode returns the resulting mode as a row, so it cannot
        // go through execute().
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction. Writer append and replay of the same op must
    /// share one.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    pub fn meta_get(&self, key: &str) -> Result<Option<String>> {
        meta_get(&self.conn, key)
    }

    pub fn meta_put(&self, key: &str, value: &str) -> Result<()> {
        meta_put(&self.conn, key, value)
    }
}

/// Resolve the database path: `$ORU_DB_PATH` wins, else `$HOME/.oru/oru.db`.
pub fn default_db_path() -> PathBuf {
    if let Ok(p) = env::var(ENV_DB_PATH) {
        return PathBuf::from(p);
    }
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".oru").join("oru.db")
}

pub(crate) fn meta_get(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

pub(crate) fn meta_put(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;
    Ok(())
}

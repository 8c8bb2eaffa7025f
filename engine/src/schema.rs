//! Versioned, forward-only schema migrations.
//!
//! The current version lives in the `schema_version` meta row (absent means
//! zero). On startup every migration above the current version is applied,
//! ascending, inside one wrapping transaction; a failure anywhere rolls the
//! whole batch back and the store must not be used.

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::store;

/// Meta key recording the applied schema version.
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// One schema step. Steps are append-only; never edit a shipped one.
pub struct Migration {
    pub version: i64,
    pub sql: &'static str,
}

/// The full migration history.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
CREATE TABLE IF NOT EXISTS oplog (
    id        TEXT PRIMARY KEY,
    task_id   TEXT NOT NULL,
    device_id TEXT NOT NULL,
    op_type   TEXT NOT NULL CHECK (op_type IN ('create','update','delete')),
    field     TEXT,
    value     TEXT,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id         TEXT PRIMARY KEY,
    title      TEXT NOT NULL,
    status     TEXT NOT NULL DEFAULT 'todo',
    priority   TEXT NOT NULL DEFAULT 'medium',
    labels     TEXT NOT NULL DEFAULT '[]',
    notes      TEXT NOT NULL DEFAULT '[]',
    metadata   TEXT NOT NULL DEFAULT '{}',
    due_at     TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    last_op_id TEXT NOT NULL
);
"#,
    },
    Migration {
        version: 2,
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_oplog_task ON oplog (task_id, timestamp, id);
CREATE INDEX IF NOT EXISTS idx_oplog_device ON oplog (device_id, id);
"#,
    },
];

/// Bring the store to the latest schema version.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    apply(conn, MIGRATIONS)
}

/// Apply `migrations` above the recorded version, ascending, in one
/// transaction. Exposed separately so tests can drive partial histories.
pub fn apply(conn: &mut Connection, migrations: &[Migration]) -> Result<()> {
    bootstrap(conn)?;
    let current = version(conn)?;

    let mut pending: Vec<&Migration> =
        migrations.iter().filter(|m| m.version > current).collect();
    pending.sort_by_key(|m| m.version);
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    let mut latest = current;
    for migration in pending {
        tx.execute_batch(migration.sql).map_err(|e| Error::Migration {
            version: migration.version,
            message: e.to_string(),
        })?;
        latest = migration.version;
    }
    store::meta_put(&tx, SCHEMA_VERSION_KEY, &latest.to_string())?;
    tx.commit()?;
    Ok(())
}

/// Currently recorded schema version; zero when never migrated.
pub fn version(conn: &Connection) -> Result<i64> {
    Ok(store::meta_get(conn, SCHEMA_VERSION_KEY)?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

/// The meta table is the migration ledger itself, so it exists outside the
/// versioned history.
fn bootstrap(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn schema_dump(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare(
                "SELECT COALESCE(sql, '') FROM sqlite_master
                 WHERE name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<String>>>()
            .unwrap()
    }

    #[test]
    fn migrate_records_latest_version() {
        let mut conn = fresh_conn();
        migrate(&mut conn).unwrap();
        assert_eq!(version(&conn).unwrap(), MIGRATIONS.last().unwrap().version);
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut conn = fresh_conn();
        migrate(&mut conn).unwrap();
        let first = schema_dump(&conn);
        migrate(&mut conn).unwrap();
        assert_eq!(first, schema_dump(&conn));
    }

    #[test]
    fn stepwise_upgrade_matches_fresh_init() {
        let mut stepwise = fresh_conn();
        apply(&mut stepwise, &MIGRATIONS[..1]).unwrap();
        apply(&mut stepwise, MIGRATIONS).unwrap();

        let mut fresh = fresh_conn();
        apply(&mut fresh, MIGRATIONS).unwrap();

        assert_eq!(schema_dump(&stepwise), schema_dump(&fresh));
        assert_eq!(version(&stepwise).unwrap(), version(&fresh).unwrap());
    }

    #[test]
    fn failed_migration_rolls_back_the_batch() {
        let mut conn = fresh_conn();
        let broken = [
            Migration {
                version: 1,
                sql: "CREATE TABLE half (id TEXT PRIMARY KEY);",
            },
            Migration {
                version: 2,
                sql: "CREATE TABLE oops (id TEXT PRIMARY KEY; -- syntax error",
            },
        ];

        let err = apply(&mut conn, &broken).unwrap_err();
        assert!(matches!(err, Error::Migration { version: 2, .. }));

        // Nothing from the batch survived, version still zero.
        assert_eq!(version(&conn).unwrap(), 0);
        assert!(schema_dump(&conn)
            .iter()
            .all(|sql| !sql.contains("half")));
    }

    #[test]
    fn migrations_are_applied_in_version_order() {
        let mut conn = fresh_conn();
        // Declared out of order on purpose.
        let out_of_order = [
            Migration {
                version: 2,
                sql: "CREATE INDEX idx_things ON things (name);",
            },
            Migration {
                version: 1,
                sql: "CREATE TABLE things (name TEXT);",
            },
        ];
        apply(&mut conn, &out_of_order).unwrap();
        assert_eq!(version(&conn).unwrap(), 2);
    }
}

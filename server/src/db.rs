//! sqlite persistence for the relay's oplog feed.
//!
//! One table, keyed by a monotone `seq`: arrival order is the canonical
//! order the pull cursor walks. Entry fields are stored and returned
//! bit-exactly; the relay adds only `seq` and `received_at`.

use oru_engine::OplogEntry;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// Type alias for the database pool.
pub type Pool = SqlitePool;

/// Create a new connection pool, creating the database file if needed.
pub async fn create_pool(database_url: &str) -> Result<Pool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
}

/// Create the oplog feed table. Safe to call on every startup.
pub async fn init_schema(pool: &Pool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS oplog (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            task_id     TEXT NOT NULL,
            device_id   TEXT NOT NULL,
            op_type     TEXT NOT NULL,
            field       TEXT,
            value       TEXT,
            timestamp   TEXT NOT NULL,
            received_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_oplog_device ON oplog (device_id, id)")
        .execute(pool)
        .await?;
    Ok(())
}

/// A stored entry row: the wire entry plus its feed position.
#[derive(Debug)]
pub struct StoredEntry {
    pub seq: i64,
    #[allow(dead_code)]
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub entry: OplogEntry,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredEntry {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let op_type: String = row.try_get("op_type")?;
        Ok(StoredEntry {
            seq: row.try_get("seq")?,
            received_at: row.try_get("received_at")?,
            entry: OplogEntry {
                id: row.try_get("id")?,
                task_id: row.try_get("task_id")?,
                device_id: row.try_get("device_id")?,
                op_type: op_type.parse().map_err(|e: oru_engine::Error| {
                    sqlx::Error::ColumnDecode {
                        index: "op_type".into(),
                        source: Box::new(e),
                    }
                })?,
                field: row.try_get("field")?,
                value: row.try_get("value")?,
                timestamp: row.try_get("timestamp")?,
            },
        })
    }
}

/// Insert entries, ignoring ids the feed already holds. Returns how many
/// were new.
pub async fn insert_entries(pool: &Pool, entries: &[OplogEntry]) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for entry in entries {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO oplog
                (id, task_id, device_id, op_type, field, value, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.task_id)
        .bind(&entry.device_id)
        .bind(entry.op_type.as_str())
        .bind(&entry.field)
        .bind(&entry.value)
        .bind(&entry.timestamp)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// Entries with `seq` strictly past `since`, oldest first.
pub async fn entries_after(
    pool: &Pool,
    since: i64,
    limit: i64,
) -> Result<Vec<StoredEntry>, sqlx::Error> {
    sqlx::query_as::<_, StoredEntry>(
        r#"
        SELECT seq, id, task_id, device_id, op_type, field, value, timestamp, received_at
        FROM oplog
        WHERE seq > $1
        ORDER BY seq ASC
        LIMIT $2
        "#,
    )
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await
}

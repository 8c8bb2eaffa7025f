//! Pull handler - serves the oplog feed to replicas.

use oru_engine::OplogEntry;
use serde::{Deserialize, Serialize};

use crate::db::{self, Pool};
use crate::error::Result;

/// Query parameters for pull sync.
#[derive(Debug, Deserialize)]
pub struct PullQuery {
    /// Cursor from the previous pull; absent or empty for the first one.
    pub cursor: Option<String>,
    /// Maximum number of entries to return.
    pub limit: Option<i64>,
}

/// Response for pull sync.
#[derive(Debug, Serialize)]
pub struct PullResponse {
    /// Entries past the cursor, in feed order.
    pub entries: Vec<OplogEntry>,
    /// Cursor for the next pull; unchanged from the request when nothing
    /// new was available.
    pub cursor: String,
    /// Whether more entries are waiting past this page.
    pub has_more: bool,
}

/// Default page size for pull.
const DEFAULT_LIMIT: i64 = 100;

/// Maximum page size for pull.
const MAX_LIMIT: i64 = 1000;

/// Process a pull request from a replica.
pub async fn handle_pull(pool: &Pool, query: PullQuery) -> Result<PullResponse> {
    let limit = query
        .limit
        .map(|l| l.clamp(1, MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT);

    // An unparsable cursor reads from the beginning; replicas deduplicate
    // re-delivered entries by id anyway.
    let since: i64 = query
        .cursor
        .as_deref()
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);

    // Fetch one extra row to learn whether more are waiting.
    let stored = db::entries_after(pool, since, limit + 1).await?;
    let has_more = stored.len() as i64 > limit;
    let stored: Vec<_> = stored.into_iter().take(limit as usize).collect();

    let cursor = match stored.last() {
        Some(last) => last.seq.to_string(),
        None => query.cursor.unwrap_or_default(),
    };
    let entries: Vec<OplogEntry> = stored.into_iter().map(|s| s.entry).collect();

    Ok(PullResponse {
        entries,
        cursor,
        has_more,
    })
}

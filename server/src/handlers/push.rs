//! Push handler - ingests oplog entries from replicas.

use oru_engine::OplogEntry;
use serde::{Deserialize, Serialize};

use crate::db::{self, Pool};
use crate::error::{AppError, Result};

/// Request body for push sync.
#[derive(Debug, Deserialize)]
pub struct PushRequest {
    /// Entries to ingest, in the device's push order.
    pub entries: Vec<OplogEntry>,
}

/// Response for push sync.
#[derive(Debug, Serialize)]
pub struct PushResponse {
    /// How many entries were newly persisted. Re-pushed duplicates are
    /// ignored and not counted.
    pub accepted: u64,
}

/// Process a push request from a replica. Idempotent: entries are
/// deduplicated by id, so at-least-once delivery is safe.
pub async fn handle_push(pool: &Pool, request: PushRequest) -> Result<PushResponse> {
    if request.entries.is_empty() {
        return Ok(PushResponse { accepted: 0 });
    }
    if let Some(bad) = request.entries.iter().find(|e| e.id.is_empty()) {
        return Err(AppError::BadRequest(format!(
            "entry for task '{}' has an empty id",
            bad.task_id
        )));
    }

    let accepted = db::insert_entries(pool, &request.entries).await?;
    tracing::debug!(
        received = request.entries.len(),
        accepted,
        "ingested push batch"
    );
    Ok(PushResponse { accepted })
}

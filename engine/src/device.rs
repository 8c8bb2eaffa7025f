//! Stable per-device identity.

use rusqlite::Connection;

use crate::error::Result;
use crate::ids::IdGen;
use crate::store;

/// Meta key holding this replica's identifier.
pub const DEVICE_ID_KEY: &str = "device_id";

/// Identifier of this replica, generated on first use and immutable after.
/// It keys the push high-water mark and is how the remote tells replicas
/// apart, so it must never change for a given database file.
pub fn get_device_id(conn: &Connection) -> Result<String> {
    if let Some(id) = store::meta_get(conn, DEVICE_ID_KEY)? {
        return Ok(id);
    }
    let id = IdGen::new().generate();
    store::meta_put(conn, DEVICE_ID_KEY, &id)?;
    Ok(id)
}

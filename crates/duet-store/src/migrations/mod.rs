//! Schema steps for the SQLite document store.
//!
//! The schema version lives in the `user_version` pragma. Opening a
//! database applies every step above it, in order, each in its own
//! transaction.

pub mod v001_initial;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// Ordered schema steps. Version `n` is `STEPS[n - 1]`.
const STEPS: &[(&str, Step)] = &[("documents table", v001_initial::up)];

pub fn schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Bring `conn` up to the newest schema. A database written by a newer
/// build is refused rather than downgraded.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let latest = STEPS.len() as u32;
    let found = schema_version(conn)?;
    if found > latest {
        return Err(StoreError::Migration(format!(
            "schema version {found} is newer than supported {latest}"
        )));
    }
    if found == latest {
        debug!(version = found, "document schema current");
        return Ok(());
    }

    for (version, (name, step)) in (1u32..).zip(STEPS).skip(found as usize) {
        let tx = conn.transaction()?;
        step(&tx).map_err(|e| StoreError::Migration(format!("step {version} ({name}): {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        info!(version, name, "applied schema step");
    }
    Ok(())
}

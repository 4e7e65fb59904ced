//! Database migration runner.
//!
//! Migrations run on every [`SessionStore::open`] / [`SessionStore::open_at`]
//! call, guarded by the `user_version` pragma so each runs exactly once.
//!
//! [`SessionStore::open`]: crate::SessionStore::open
//! [`SessionStore::open_at`]: crate::SessionStore::open_at

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version. Bump this and extend [`run_migrations`] whenever
/// the schema changes.
const CURRENT_VERSION: u32 = 1;

/// Run all pending migrations against the open connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::debug!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking session store migrations"
    );

    if current < 1 {
        tracing::info!("applying migration v001_initial");
        v001_initial(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    // Future migrations would be added here:
    // if current < 2 {
    //     v002_xxx(conn)?;
    //     conn.pragma_update(None, "user_version", 2)?;
    // }

    Ok(())
}

/// v001: the single key-value table holding all persisted session state.
fn v001_initial(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS session_kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )
}

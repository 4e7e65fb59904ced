//! Database connection management.
//!
//! The [`SessionStore`] owns a [`rusqlite::Connection`] behind a mutex so the
//! store can be shared (`Arc<SessionStore>`) between the REST client and the
//! session container, and guarantees that migrations run before any other
//! operation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migrations;

/// Key-value persistence for session state.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/causerie/session.db`
    /// - macOS:   `~/Library/Application Support/io.causerie.causerie/session.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\causerie\causerie\data\session.db`
    pub fn open() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("io", "causerie", "causerie").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("session.db");

        tracing::info!(path = %db_path.display(), "opening session store");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    ///
    /// Useful for tests and for embedding the store inside custom directory
    /// layouts.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store. Contents vanish on drop; intended for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Read a raw value.
    ///
    /// The literal strings `"undefined"` and `"null"` are legacy artifacts of
    /// the original storage format; they are treated as absent and deleted on
    /// sight.
    pub(crate) fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self
            .conn()?
            .query_row(
                "SELECT value FROM session_kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match value.as_deref() {
            Some("undefined") | Some("null") => {
                tracing::warn!(key, "discarding legacy placeholder value");
                self.delete_raw(key)?;
                Ok(None)
            }
            _ => Ok(value),
        }
    }

    pub(crate) fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO session_kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub(crate) fn delete_raw(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM session_kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

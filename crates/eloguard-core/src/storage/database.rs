//! SQLite-backed key-value store.
//!
//! Provides persistent storage for:
//! - Per-instance cooldown end times
//! - Per player/mode loss-streak records
//! - The session instance token (when opened as a session store)

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tokio::sync::broadcast;

use super::data_dir;
use super::store::{Store, StoreChange};
use crate::error::PersistenceError;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// SQLite database exposing a single `kv` table through [`Store`].
///
/// Change notifications cover writes made through this handle only; another
/// process writing the same file is not observed.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteStore {
    /// Open the local store at `~/.config/eloguard/eloguard.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self, PersistenceError> {
        let dir = data_dir().map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        Self::open_at(&dir.join("eloguard.db"))
    }

    /// Open the session store for `label` under `~/.config/eloguard/sessions/`.
    pub fn open_session(label: &str) -> Result<Self, PersistenceError> {
        let valid = !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(PersistenceError::QueryFailed(format!(
                "invalid session label '{label}'"
            )));
        }
        let dir = data_dir()
            .map(|d| d.join("sessions"))
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        std::fs::create_dir_all(&dir).map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;
        Self::open_at(&dir.join(format!("{label}.db")))
    }

    /// Open (or create) a store at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path).map_err(|source| PersistenceError::OpenFailed {
            path: PathBuf::from(path),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory().map_err(|source| PersistenceError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistenceError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
        })
    }

    fn kv_get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn kv_set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn kv_remove(&self, key: &str) -> Result<bool, PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::Poisoned)?;
        let affected = conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.kv_get(key)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.kv_set(key, value)?;
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            new_value: Some(value.to_string()),
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PersistenceError> {
        if self.kv_remove(key)? {
            let _ = self.changes.send(StoreChange {
                key: key.to_string(),
                new_value: None,
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

mod memory;
mod schema;
mod writer;

use crate::error::Result;
use crate::types::Category;
use parking_lot::Mutex;
use rusqlite::{params, Connection as SqliteConnection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

pub use memory::MemoryStore;
pub use schema::{SCHEMA, SCHEMA_VERSION};
pub use writer::PersistWriter;

/// Durable key/value storage for persisted rule categories.
///
/// Saves are best-effort: callers treat a failed save as a warning and keep
/// their in-memory state.
pub trait KeyValueStore: Send + Sync {
    fn save(&self, category: Category, value: &str) -> Result<()>;

    /// `None` when the key was never written.
    fn load(&self, key: &str) -> Result<Option<String>>;
}

/// SQLite-backed store
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = SqliteConnection::open(path)?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = SqliteConnection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: SqliteConnection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.conn.lock();
        let version = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    }
}

impl KeyValueStore for Database {
    fn save(&self, category: Category, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![category.key(), value],
        )?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

use chrono::Utc;
use tracing::debug;

use super::errors::RepositoryError;
#[cfg(feature = "sqlite")]
use crate::database::DatabasePool;

/// Durable string storage addressed by key.
///
/// Calls are synchronous: the local history must be persisted before the
/// mutating call returns, with no suspension point in between.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;

    /// Replace the value stored under `key`
    fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError>;
}

/// Key/value storage in the `kv_store` table of the local SQLite database
#[cfg(feature = "sqlite")]
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    pool: DatabasePool,
}

#[cfg(feature = "sqlite")]
impl SqliteKeyValueStore {
    /// Create a store on top of an initialized pool
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "sqlite")]
impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        debug!("Reading key from kv_store: {}", key);

        let conn = self.pool.sqlite().get()?;
        let mut stmt = conn.prepare("SELECT value FROM kv_store WHERE key = ?1")?;

        match stmt.query_row([key], |row| row.get::<_, String>(0)) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(RepositoryError::Sqlite(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        debug!("Writing key to kv_store: {} ({} bytes)", key, value.len());

        let conn = self.pool.sqlite().get()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (key, value, Utc::now().to_rfc3339()),
        )?;

        Ok(())
    }
}

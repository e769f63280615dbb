use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tokio::sync::mpsc;
use tracing::debug;

use super::errors::RepositoryError;
use super::key_value::KeyValueStore;
use super::shared::{sort_newest_first, InsertFeed, SharedReadingsBackend};
use crate::models::reading::{NewSharedReading, SharedReadingRow};

/// In-memory key/value storage, for hosts without a durable location
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyValueStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryKeyValueStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with one value
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        if let Ok(mut values) = store.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        store
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let values = self.values.lock()?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        let mut values = self.values.lock()?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SharedTable {
    /// Rows in insertion order
    rows: Vec<SharedReadingRow>,
    /// Open change feeds
    subscribers: Vec<mpsc::UnboundedSender<SharedReadingRow>>,
}

/// Process-local shared store with insert fan-out to every open feed.
///
/// Clones share the same table, so several clients in one process see each
/// other's inserts the way separate devices would through a hosted store.
#[derive(Debug, Clone, Default)]
pub struct InMemorySharedBackend {
    table: Arc<Mutex<SharedTable>>,
}

impl InMemorySharedBackend {
    /// Create an empty shared store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently open feeds
    pub fn open_feeds(&self) -> usize {
        self.table
            .lock()
            .map(|table| table.subscribers.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Close every open feed, as a dropped connection would
    pub fn disconnect_all(&self) {
        if let Ok(mut table) = self.table.lock() {
            debug!("Closing {} shared feeds", table.subscribers.len());
            table.subscribers.clear();
        }
    }
}

#[async_trait]
impl SharedReadingsBackend for InMemorySharedBackend {
    async fn insert(&self, reading: NewSharedReading) -> Result<SharedReadingRow, RepositoryError> {
        let mut table = self.table.lock()?;

        if table.rows.iter().any(|row| row.id == reading.id) {
            return Err(RepositoryError::Conflict(reading.id));
        }

        let shared_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let row = SharedReadingRow::from_insert(reading, shared_at);
        table.rows.push(row.clone());

        // Fan out, dropping feeds whose receiver is gone
        table.subscribers.retain(|tx| tx.send(row.clone()).is_ok());
        debug!("Shared row {} inserted, {} feeds notified", row.id, table.subscribers.len());

        Ok(row)
    }

    async fn list(&self) -> Result<Vec<SharedReadingRow>, RepositoryError> {
        let table = self.table.lock()?;
        let mut rows: Vec<SharedReadingRow> = table.rows.iter().rev().cloned().collect();
        sort_newest_first(&mut rows);
        Ok(rows)
    }

    async fn subscribe_inserts(&self) -> Result<InsertFeed, RepositoryError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut table = self.table.lock()?;
        table.subscribers.push(tx);
        Ok(rx)
    }
}

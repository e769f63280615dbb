//! Test doubles for the storage seams, available to dependent crates
//! through the `mock` feature.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::errors::RepositoryError;
use super::in_memory::{InMemoryKeyValueStore, InMemorySharedBackend};
use super::key_value::KeyValueStore;
use super::shared::{InsertFeed, SharedReadingsBackend};
use crate::models::reading::{NewSharedReading, SharedReadingRow};

/// Shared backend that fails on demand, wrapping an in-memory store.
#[derive(Debug, Clone, Default)]
pub struct FlakySharedBackend {
    inner: InMemorySharedBackend,
    failing_inserts: Arc<AtomicUsize>,
    insert_attempts: Arc<AtomicUsize>,
    fail_list: Arc<AtomicBool>,
    fail_subscribe: Arc<AtomicBool>,
}

impl FlakySharedBackend {
    /// Wrap a fresh in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing store, so other clients can share it
    pub fn wrapping(inner: InMemorySharedBackend) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Fail the next `count` insert attempts
    pub fn fail_next_inserts(self, count: usize) -> Self {
        self.failing_inserts.store(count, Ordering::SeqCst);
        self
    }

    /// Make every list call fail (or succeed again)
    pub fn set_list_failure(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    /// Make every subscribe call fail
    pub fn with_subscribe_failure(self) -> Self {
        self.fail_subscribe.store(true, Ordering::SeqCst);
        self
    }

    /// Number of insert calls seen so far, failed ones included
    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    /// The wrapped store
    pub fn inner(&self) -> &InMemorySharedBackend {
        &self.inner
    }
}

#[async_trait]
impl SharedReadingsBackend for FlakySharedBackend {
    async fn insert(&self, reading: NewSharedReading) -> Result<SharedReadingRow, RepositoryError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(RepositoryError::Remote {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }

        self.inner.insert(reading).await
    }

    async fn list(&self) -> Result<Vec<SharedReadingRow>, RepositoryError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(RepositoryError::Transport("connection refused".to_string()));
        }
        self.inner.list().await
    }

    async fn subscribe_inserts(&self) -> Result<InsertFeed, RepositoryError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(RepositoryError::Transport("realtime unavailable".to_string()));
        }
        self.inner.subscribe_inserts().await
    }
}

/// Key/value store whose writes can be switched to fail
#[derive(Debug, Clone, Default)]
pub struct FailingKeyValueStore {
    inner: InMemoryKeyValueStore,
    fail_writes: Arc<AtomicBool>,
}

impl FailingKeyValueStore {
    /// A store whose writes fail from the start
    pub fn new() -> Self {
        let store = Self::default();
        store.set_write_failure(true);
        store
    }

    /// A store seeded with one value, writes succeeding until switched
    pub fn with_value(key: &str, value: &str) -> Self {
        Self {
            inner: InMemoryKeyValueStore::with_value(key, value),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Switch write failures on or off
    pub fn set_write_failure(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Read through to the wrapped store
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner.get(key).ok().flatten()
    }
}

impl KeyValueStore for FailingKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::WriteFailed("quota exceeded".to_string()));
        }
        self.inner.set(key, value)
    }
}

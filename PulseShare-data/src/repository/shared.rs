use async_trait::async_trait;
use tokio::sync::mpsc;

use super::errors::RepositoryError;
use crate::models::reading::{NewSharedReading, SharedReadingRow};

/// Rows inserted into the shared store after the feed was opened, in
/// arrival order. The feed ends (yields `None`) when the underlying channel
/// closes; dropping the receiver releases the channel.
pub type InsertFeed = mpsc::UnboundedReceiver<SharedReadingRow>;

/// Access to the multi-contributor shared readings store.
///
/// The store is an external collaborator: it assigns `shared_at`, returns
/// rows newest-first, and pushes newly inserted rows to open feeds. There is
/// no delete operation.
#[async_trait]
pub trait SharedReadingsBackend: Send + Sync {
    /// Insert a reading and return the stored row
    async fn insert(&self, reading: NewSharedReading) -> Result<SharedReadingRow, RepositoryError>;

    /// List all rows ordered by `shared_at` descending
    async fn list(&self) -> Result<Vec<SharedReadingRow>, RepositoryError>;

    /// Open a change feed that delivers rows inserted from now on
    async fn subscribe_inserts(&self) -> Result<InsertFeed, RepositoryError>;
}

/// Sort rows newest-first by share time.
///
/// The sort is stable, so callers that pass rows in insertion order should
/// reverse them first to keep the later insert ahead on equal timestamps.
pub fn sort_newest_first(rows: &mut [SharedReadingRow]) {
    rows.sort_by(|a, b| b.shared_at.cmp(&a.shared_at));
}

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pulse_share_data::repository::{sort_newest_first, RepositoryError, SharedReadingsBackend};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::entities::conversions;
use crate::entities::Reading;
use crate::notify::{Notice, Notifier};
use crate::services::retry::RetryPolicy;

/// Live inserts a [`Subscription`] holds before further ones are not
/// delivered to it; the cache still receives every insert
pub const SUBSCRIPTION_BACKLOG: usize = 64;

/// Shared store errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// The backend failed or could not be reached
    #[error("Shared store error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Whether the cached shared collection reflects the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharedLoadState {
    NotLoaded,
    Loaded,
    /// The last list call failed; cached readings, if any, are stale
    Failed(String),
}

/// State of the live insert feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Idle,
    Live,
    /// Ended on the store's side; stays closed until the next subscribe
    Closed,
}

/// Point-in-time view of the shared collection
#[derive(Debug, Clone, PartialEq)]
pub struct SharedSnapshot {
    pub readings: Vec<Reading>,
    pub load: SharedLoadState,
    pub feed: FeedState,
}

/// How a submit ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The reading is in the shared collection
    Shared(Reading),
    /// Every attempt failed; the reading exists only locally
    SavedLocallyOnly { attempts: u32, last_error: String },
}

impl SubmitOutcome {
    pub fn is_shared(&self) -> bool {
        matches!(self, SubmitOutcome::Shared(_))
    }
}

#[derive(Debug)]
struct SharedCache {
    readings: Vec<Reading>,
    ids: HashSet<String>,
    // arrival sequence of readings merged in since the last list
    arrivals: HashMap<String, u64>,
    seq: u64,
    load: SharedLoadState,
    feed: FeedState,
    feed_generation: u64,
}

impl SharedCache {
    fn new() -> Self {
        Self {
            readings: Vec::new(),
            ids: HashSet::new(),
            arrivals: HashMap::new(),
            seq: 0,
            load: SharedLoadState::NotLoaded,
            feed: FeedState::Idle,
            feed_generation: 0,
        }
    }

    /// Prepend a reading unless its id is already known
    fn merge_new(&mut self, reading: Reading) -> bool {
        if self.ids.contains(&reading.id) {
            return false;
        }

        self.seq += 1;
        self.arrivals.insert(reading.id.clone(), self.seq);
        self.ids.insert(reading.id.clone());
        self.readings.insert(0, reading);
        true
    }

    /// Replace the collection with a fresh listing.
    ///
    /// Readings merged in after `since` arrived while the listing was in
    /// flight and may be missing from it, so they stay on top.
    fn replace(&mut self, fetched: Vec<Reading>, since: u64) {
        let fetched_ids: HashSet<String> = fetched.iter().map(|r| r.id.clone()).collect();
        let mut readings: Vec<Reading> = self
            .readings
            .drain(..)
            .filter(|r| {
                !fetched_ids.contains(&r.id) && self.arrivals.get(&r.id).is_some_and(|seq| *seq > since)
            })
            .collect();
        let kept = readings.len();
        readings.extend(fetched);

        self.ids = readings.iter().map(|r| r.id.clone()).collect();
        self.arrivals.retain(|id, seq| *seq > since && !fetched_ids.contains(id));
        self.readings = readings;
        self.load = SharedLoadState::Loaded;

        if kept > 0 {
            debug!("Kept {} live arrivals on top of the fresh listing", kept);
        }
    }
}

fn lock(cache: &Mutex<SharedCache>) -> MutexGuard<'_, SharedCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client for the shared readings store.
///
/// Keeps a newest-first cache of the shared collection that is fed by
/// listings, successful submits and the live insert feed. Every path merges
/// by id, so a reading is never cached twice.
#[derive(Clone)]
pub struct RemoteSyncClient {
    backend: Arc<dyn SharedReadingsBackend>,
    policy: RetryPolicy,
    cache: Arc<Mutex<SharedCache>>,
    notifier: Notifier,
}

impl std::fmt::Debug for RemoteSyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSyncClient")
            .field("policy", &self.policy)
            .field("cache", &self.cache)
            .finish()
    }
}

impl RemoteSyncClient {
    pub fn new(backend: Arc<dyn SharedReadingsBackend>, policy: RetryPolicy, notifier: Notifier) -> Self {
        Self {
            backend,
            policy,
            cache: Arc::new(Mutex::new(SharedCache::new())),
            notifier,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetch the shared collection, newest first, without touching the cache.
    ///
    /// Rows that cannot be read are skipped with a warning.
    pub async fn list_shared(&self) -> Result<Vec<Reading>, SyncError> {
        let mut rows = self.backend.list().await?;
        sort_newest_first(&mut rows);

        let total = rows.len();
        let readings: Vec<Reading> = rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                match conversions::convert_from_shared_row(row) {
                    Ok(reading) => Some(reading),
                    Err(e) => {
                        warn!("Skipping shared row {}: {}", id, e);
                        None
                    }
                }
            })
            .collect();

        debug!("Listed {} of {} shared rows", readings.len(), total);
        Ok(readings)
    }

    /// Reload the shared collection into the cache.
    ///
    /// On failure the cache keeps its previous contents, its state becomes
    /// [`SharedLoadState::Failed`] and a notice is sent.
    pub async fn refetch(&self) -> Result<Vec<Reading>, SyncError> {
        let since = lock(&self.cache).seq;

        match self.list_shared().await {
            Ok(fetched) => {
                let mut cache = lock(&self.cache);
                cache.replace(fetched, since);
                info!("Shared readings refreshed: {}", cache.readings.len());
                Ok(cache.readings.clone())
            }
            Err(e) => {
                lock(&self.cache).load = SharedLoadState::Failed(e.to_string());
                self.notifier.notify(Notice::SharedLoadFailed { reason: e.to_string() });
                Err(e)
            }
        }
    }

    /// Write a reading to the shared store, retrying per the policy.
    ///
    /// Never returns an error: exhaustion is reported as
    /// [`SubmitOutcome::SavedLocallyOnly`] together with exactly one notice.
    pub async fn submit(&self, reading: &Reading) -> SubmitOutcome {
        let payload = conversions::convert_to_new_shared_reading(reading);
        let backend = self.backend.clone();

        let result = self
            .policy
            .run(|attempt| {
                let backend = backend.clone();
                let payload = payload.clone();
                async move {
                    debug!("Sharing reading {} (attempt {})", payload.id, attempt);
                    match backend.insert(payload).await {
                        Ok(row) => Ok(Some(row)),
                        // an earlier attempt landed even though its response was lost
                        Err(RepositoryError::Conflict(id)) if attempt > 1 => {
                            info!("Reading {} was already shared", id);
                            Ok(None)
                        }
                        Err(e) => Err(e),
                    }
                }
            })
            .await;

        match result {
            Ok(row) => {
                let shared = row
                    .and_then(|row| conversions::convert_from_shared_row(row).ok())
                    .unwrap_or_else(|| reading.clone());
                let merged = lock(&self.cache).merge_new(shared.clone());
                if !merged {
                    debug!("Reading {} already arrived through the live feed", shared.id);
                }

                let assessment = reading.classify_now();
                self.notifier.notify(Notice::ReadingShared {
                    id: reading.id.clone(),
                    status: reading.status_or_classify(),
                    message: assessment.message,
                });
                SubmitOutcome::Shared(shared)
            }
            Err(exhausted) => {
                self.notifier.notify(Notice::SavedLocallyOnly {
                    id: reading.id.clone(),
                    attempts: exhausted.attempts,
                });
                SubmitOutcome::SavedLocallyOnly {
                    attempts: exhausted.attempts,
                    last_error: exhausted.last_error.to_string(),
                }
            }
        }
    }

    /// Open the live insert feed.
    ///
    /// Inserts from other clients are merged into the cache and handed to the
    /// returned [`Subscription`]; inserts already cached (for example this
    /// client's own submits) are dropped. A subscription that is not drained
    /// holds at most [`SUBSCRIPTION_BACKLOG`] inserts; later ones only reach
    /// the cache. Dropping or unsubscribing stops delivery and releases the
    /// feed.
    pub async fn subscribe_inserts(&self) -> Result<Subscription, SyncError> {
        let mut feed = self.backend.subscribe_inserts().await?;

        let generation = {
            let mut cache = lock(&self.cache);
            cache.feed_generation += 1;
            cache.feed = FeedState::Live;
            cache.feed_generation
        };
        info!("Live shared feed opened");

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BACKLOG);
        let cache = self.cache.clone();
        let notifier = self.notifier.clone();

        let pump = tokio::spawn(async move {
            while let Some(row) = feed.recv().await {
                let id = row.id.clone();
                let reading = match conversions::convert_from_shared_row(row) {
                    Ok(reading) => reading,
                    Err(e) => {
                        warn!("Skipping live shared row {}: {}", id, e);
                        continue;
                    }
                };

                if !lock(&cache).merge_new(reading.clone()) {
                    debug!("Dropping duplicate live insert {}", id);
                    continue;
                }

                match tx.try_send(reading) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => debug!("Subscriber backlog full, {} only cached", id),
                    Err(TrySendError::Closed(_)) => return,
                }
            }

            let closed = {
                let mut cache = lock(&cache);
                let current = cache.feed_generation == generation && cache.feed == FeedState::Live;
                if current {
                    cache.feed = FeedState::Closed;
                }
                current
            };
            if closed {
                notifier.notify(Notice::FeedClosed);
            }
        });

        Ok(Subscription {
            generation,
            rx,
            pump,
            cache: self.cache.clone(),
        })
    }

    /// Cached shared readings, newest first
    pub fn shared_readings(&self) -> Vec<Reading> {
        lock(&self.cache).readings.clone()
    }

    pub fn load_state(&self) -> SharedLoadState {
        lock(&self.cache).load.clone()
    }

    pub fn feed_state(&self) -> FeedState {
        lock(&self.cache).feed
    }

    pub fn snapshot(&self) -> SharedSnapshot {
        let cache = lock(&self.cache);
        SharedSnapshot {
            readings: cache.readings.clone(),
            load: cache.load.clone(),
            feed: cache.feed,
        }
    }
}

/// Handle on an open live feed
#[derive(Debug)]
pub struct Subscription {
    generation: u64,
    rx: mpsc::Receiver<Reading>,
    pump: JoinHandle<()>,
    cache: Arc<Mutex<SharedCache>>,
}

impl Subscription {
    /// Next insert from another client; `None` once the feed has ended
    pub async fn next(&mut self) -> Option<Reading> {
        self.rx.recv().await
    }

    /// Next insert if one is already waiting
    pub fn try_next(&mut self) -> Option<Reading> {
        self.rx.try_recv().ok()
    }

    /// Stop delivery and release the feed
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.pump.abort();

        let mut cache = lock(&self.cache);
        if cache.feed_generation == self.generation && cache.feed == FeedState::Live {
            cache.feed = FeedState::Idle;
        }
        debug!("Live shared feed released");
    }
}

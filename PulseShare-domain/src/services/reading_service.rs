use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use pulse_share_data::database::{open_sqlite_pool, DatabaseConfig, DatabaseError};
use pulse_share_data::repository::{
    InMemorySharedBackend, KeyValueStore, RepositoryError, SharedReadingsBackend, SqliteKeyValueStore,
};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::logging::{log_session_event, SessionEvent};
use crate::auth::Session;
use crate::config::{AppConfig, ConfigError, SyncConfig};
use crate::entities::{Reading, ReadingDraft, ReadingInput};
use crate::notify::{Notice, Notifier};
use crate::services::classifier::classify_pressure;
use crate::services::local_store::LocalStore;
use crate::services::sync::{RemoteSyncClient, SharedSnapshot, SubmitOutcome, Subscription, SyncError};

/// Reading service errors
#[derive(Debug, Error)]
pub enum ReadingServiceError {
    /// Input was rejected; nothing was stored
    #[error("Validation error: {0}")]
    Validation(String),

    /// Adding a reading needs a tokio runtime to share it in the background
    #[error("No async runtime available to share the reading")]
    NoRuntime,

    /// Shared store error
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Repository error
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A reading that is stored locally and being shared in the background
#[derive(Debug)]
pub struct PendingShare {
    reading: Reading,
    handle: JoinHandle<SubmitOutcome>,
}

impl PendingShare {
    /// The reading as stored locally
    pub fn reading(&self) -> &Reading {
        &self.reading
    }

    /// Wait for the share to finish.
    ///
    /// Dropping a `PendingShare` does not cancel the share; this is only
    /// needed by callers that want the outcome.
    pub async fn outcome(self) -> SubmitOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => SubmitOutcome::SavedLocallyOnly {
                attempts: 0,
                last_error: e.to_string(),
            },
        }
    }
}

/// Entry point for the UI: add, delete and list readings.
///
/// Local writes happen synchronously inside each call. Sharing runs as a
/// background task whose result reaches the user through [`Notice`]s.
#[derive(Clone)]
pub struct ReadingService {
    local: Arc<Mutex<LocalStore>>,
    sync: RemoteSyncClient,
    session: Arc<RwLock<Session>>,
    notifier: Notifier,
    local_degraded: Arc<AtomicBool>,
}

impl std::fmt::Debug for ReadingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadingService")
            .field("local", &self.local)
            .field("sync", &self.sync)
            .field("session", &self.session)
            .finish()
    }
}

impl ReadingService {
    pub fn new(local: LocalStore, sync: RemoteSyncClient, session: Session, notifier: Notifier) -> Self {
        Self {
            local: Arc::new(Mutex::new(local)),
            sync,
            session: Arc::new(RwLock::new(session)),
            notifier,
            local_degraded: Arc::new(AtomicBool::new(false)),
        }
    }

    fn local(&self) -> MutexGuard<'_, LocalStore> {
        self.local.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_local_failure(&self, reason: impl std::fmt::Display) {
        warn!("Local history could not be saved: {}", reason);
        self.local_degraded.store(true, Ordering::SeqCst);
        self.notifier.notify(Notice::LocalSaveFailed {
            reason: reason.to_string(),
        });
    }

    /// Record a reading and start sharing it.
    ///
    /// Invalid input is rejected before anything is stored. Otherwise the
    /// reading is classified, stored locally and returned immediately while
    /// the share runs in the background. A failing local write does not fail
    /// the call: the reading stays in memory and a notice is sent.
    pub fn add_reading(&self, input: ReadingInput) -> Result<PendingShare, ReadingServiceError> {
        let runtime = Handle::try_current().map_err(|_| ReadingServiceError::NoRuntime)?;

        let draft = ReadingDraft::parse(input).map_err(|e| {
            debug!("Rejected reading input: {}", e);
            ReadingServiceError::Validation(e)
        })?;

        let assessment = classify_pressure(draft.systolic, draft.diastolic);
        let subject_name = self.session().subject_name(draft.name.as_deref());
        let reading = draft.into_reading(Uuid::new_v4().to_string(), subject_name, assessment.status);

        if let Err(e) = self.local().append(reading.clone()) {
            self.record_local_failure(e);
        }
        info!(
            "Recorded reading {} ({}/{}, {})",
            reading.id, reading.systolic, reading.diastolic, assessment.status
        );

        let sync = self.sync.clone();
        let to_share = reading.clone();
        let handle = runtime.spawn(async move { sync.submit(&to_share).await });

        Ok(PendingShare { reading, handle })
    }

    /// Remove a reading from the local history.
    ///
    /// The shared collection is append-only and is never touched. Returns
    /// whether a reading was removed.
    pub fn delete_reading(&self, id: &str) -> bool {
        let removed = match self.local().remove(id) {
            Ok(removed) => removed,
            Err(e) => {
                // removed from memory, only the write failed
                self.record_local_failure(e);
                true
            }
        };

        if removed {
            self.notifier.notify(Notice::ReadingDeleted { id: id.to_string() });
        }
        removed
    }

    /// Personal history, newest first
    pub fn local_readings(&self) -> Vec<Reading> {
        self.local().readings().to_vec()
    }

    /// Community readings as currently cached, newest first
    pub fn shared_readings(&self) -> Vec<Reading> {
        self.sync.shared_readings()
    }

    pub fn shared_snapshot(&self) -> SharedSnapshot {
        self.sync.snapshot()
    }

    /// Open the live feed and load the shared collection.
    ///
    /// The feed is opened first so nothing inserted during the load is
    /// missed. A failed load is recorded and reported but does not close the
    /// feed.
    pub async fn connect(&self) -> Result<Subscription, ReadingServiceError> {
        let subscription = self.sync.subscribe_inserts().await?;
        if let Err(e) = self.sync.refetch().await {
            warn!("Initial load of shared readings failed: {}", e);
        }
        Ok(subscription)
    }

    /// Reload the shared collection on request
    pub async fn refresh_shared(&self) -> Result<Vec<Reading>, ReadingServiceError> {
        Ok(self.sync.refetch().await?)
    }

    pub fn session(&self) -> Session {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the session, e.g. after sign-in or sign-out
    pub fn set_session(&self, session: Session) {
        let mut current = self.session.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(event) = SessionEvent::between(&current, &session) {
            log_session_event(&event);
        }
        *current = session;
    }

    /// Whether a local write failed during this session
    pub fn is_local_degraded(&self) -> bool {
        self.local_degraded.load(Ordering::SeqCst)
    }

    pub fn sync_client(&self) -> &RemoteSyncClient {
        &self.sync
    }
}

#[cfg(feature = "remote")]
fn hosted_backend(config: &SyncConfig) -> Result<Option<Arc<dyn SharedReadingsBackend>>, RepositoryError> {
    let Some(remote) = config.remote_config() else {
        return Ok(None);
    };
    info!("Using hosted shared store table {}", remote.table);
    let backend: Arc<dyn SharedReadingsBackend> = Arc::new(pulse_share_data::remote::RestSharedBackend::new(remote)?);
    Ok(Some(backend))
}

#[cfg(not(feature = "remote"))]
fn hosted_backend(_config: &SyncConfig) -> Result<Option<Arc<dyn SharedReadingsBackend>>, RepositoryError> {
    Ok(None)
}

/// Pick the shared backend: the hosted store when configured, otherwise an
/// in-process one
fn shared_backend(config: &SyncConfig) -> Result<Arc<dyn SharedReadingsBackend>, ReadingServiceError> {
    if let Some(backend) = hosted_backend(config)? {
        return Ok(backend);
    }

    warn!(
        "No hosted shared store configured for table {}, sharing in-process only",
        config.shared_table
    );
    Ok(Arc::new(InMemorySharedBackend::new()))
}

/// Create a reading service from configuration: SQLite for the local history
/// and the configured shared store.
///
/// When the database file cannot be opened the history is kept in memory for
/// the session only; the service starts degraded and a `LocalSaveFailed`
/// notice is sent.
pub fn create_default_reading_service(
    config: &AppConfig,
    session: Session,
    notifier: Notifier,
) -> Result<ReadingService, ReadingServiceError> {
    let (pool, open_error) = match open_sqlite_pool(&config.database) {
        Ok(pool) => (pool, None),
        Err(e) if config.database.sqlite_path.is_some() => {
            warn!("Keeping the local history in memory for this session");
            (open_sqlite_pool(&DatabaseConfig::in_memory())?, Some(e))
        }
        Err(e) => return Err(e.into()),
    };
    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::new(pool));
    let local = LocalStore::load(store, config.sync.local_store_key.clone());

    let sync = RemoteSyncClient::new(shared_backend(&config.sync)?, config.sync.retry_policy(), notifier.clone());
    let service = ReadingService::new(local, sync, session, notifier);
    if let Some(e) = open_error {
        service.record_local_failure(format!("history will not survive a restart: {}", e));
    }
    Ok(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionUser;
    use crate::entities::{PressureStatus, ANONYMOUS};
    use crate::services::local_store::DEFAULT_LOCAL_STORE_KEY;
    use crate::services::retry::RetryPolicy;
    use pulse_share_data::repository::mocks::{FailingKeyValueStore, FlakySharedBackend};
    use pulse_share_data::repository::InMemoryKeyValueStore;

    fn service_with(
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn SharedReadingsBackend>,
        session: Session,
    ) -> (ReadingService, crate::notify::NoticeReceiver) {
        let (notifier, rx) = Notifier::channel();
        let local = LocalStore::load(store, DEFAULT_LOCAL_STORE_KEY);
        let sync = RemoteSyncClient::new(backend, RetryPolicy::default(), notifier.clone());
        (ReadingService::new(local, sync, session, notifier), rx)
    }

    fn in_memory_service(session: Session) -> (ReadingService, crate::notify::NoticeReceiver) {
        service_with(
            Arc::new(InMemoryKeyValueStore::new()),
            Arc::new(InMemorySharedBackend::new()),
            session,
        )
    }

    #[tokio::test]
    async fn test_add_reading_stores_and_shares() {
        let (service, _rx) = in_memory_service(Session::anonymous());

        let pending = service
            .add_reading(ReadingInput::new("150", "70", "80").with_name("Bob"))
            .unwrap();
        let reading = pending.reading().clone();
        assert_eq!(reading.status, Some(PressureStatus::High));
        assert_eq!(reading.subject_name, "Bob");
        assert_eq!(service.local_readings(), vec![reading.clone()]);

        assert!(pending.outcome().await.is_shared());
        assert_eq!(service.shared_readings()[0].id, reading.id);
    }

    #[tokio::test]
    async fn test_invalid_input_is_a_no_op() {
        let (service, mut rx) = in_memory_service(Session::anonymous());

        let result = service.add_reading(ReadingInput::new("abc", "80", "70"));
        assert!(matches!(result, Err(ReadingServiceError::Validation(_))));
        let result = service.add_reading(ReadingInput::new("120", "80", "0"));
        assert!(matches!(result, Err(ReadingServiceError::Validation(_))));
        assert!(service.local_readings().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_add_reading_without_runtime_is_rejected() {
        let (service, _rx) = in_memory_service(Session::anonymous());
        let result = service.add_reading(ReadingInput::new("120", "80", "70"));
        assert!(matches!(result, Err(ReadingServiceError::NoRuntime)));
        assert!(service.local_readings().is_empty());

        // the same call succeeds once a runtime is running
        let added = tokio_test::block_on(async { service.add_reading(ReadingInput::new("120", "80", "70")).map(|_| ()) });
        tokio_test::assert_ok!(added);
        assert_eq!(service.local_readings().len(), 1);
    }

    #[tokio::test]
    async fn test_session_identity_is_the_subject() {
        let session = Session::signed_in(SessionUser::new("u-1").with_email("alice@x.com"));
        let (service, _rx) = in_memory_service(session);

        let pending = service
            .add_reading(ReadingInput::new("118", "76", "64").with_name("Bob"))
            .unwrap();
        assert_eq!(pending.reading().subject_name, "alice@x.com");

        service.set_session(Session::anonymous());
        let pending = service.add_reading(ReadingInput::new("118", "76", "64")).unwrap();
        assert_eq!(pending.reading().subject_name, ANONYMOUS);
    }

    #[tokio::test]
    async fn test_local_write_failure_keeps_reading_in_memory() {
        let (service, mut rx) = service_with(
            Arc::new(FailingKeyValueStore::new()),
            Arc::new(InMemorySharedBackend::new()),
            Session::anonymous(),
        );

        let pending = service.add_reading(ReadingInput::new("120", "80", "70")).unwrap();
        assert_eq!(service.local_readings().len(), 1);
        assert!(service.is_local_degraded());
        assert!(matches!(rx.try_recv().unwrap(), Notice::LocalSaveFailed { .. }));

        assert!(pending.outcome().await.is_shared());
    }

    #[tokio::test]
    async fn test_delete_is_local_only() {
        let (service, mut rx) = in_memory_service(Session::anonymous());
        let first = service.add_reading(ReadingInput::new("120", "80", "70")).unwrap();
        let id = first.reading().id.clone();
        first.outcome().await;
        let _ = rx.try_recv();

        assert!(service.delete_reading(&id));
        assert!(service.local_readings().is_empty());
        assert_eq!(service.shared_readings().len(), 1);
        assert_eq!(rx.try_recv().unwrap(), Notice::ReadingDeleted { id: id.clone() });

        assert!(!service.delete_reading(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_share_stays_local() {
        let backend = FlakySharedBackend::new().fail_next_inserts(4);
        let (service, mut rx) = service_with(
            Arc::new(InMemoryKeyValueStore::new()),
            Arc::new(backend.clone()),
            Session::anonymous(),
        );

        let pending = service.add_reading(ReadingInput::new("120", "80", "70")).unwrap();
        let outcome = pending.outcome().await;

        assert!(!outcome.is_shared());
        assert_eq!(backend.insert_attempts(), 4);
        assert_eq!(service.local_readings().len(), 1);
        assert!(service.shared_readings().is_empty());
        assert!(matches!(rx.try_recv().unwrap(), Notice::SavedLocallyOnly { attempts: 4, .. }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_default_service_uses_sqlite_history() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            database: pulse_share_data::database::DatabaseConfig {
                sqlite_path: Some(dir.path().join("history.db").to_string_lossy().into_owned()),
                ..Default::default()
            },
            sync: SyncConfig::default(),
        };

        let service = create_default_reading_service(&config, Session::anonymous(), Notifier::disabled()).unwrap();
        assert!(service.local_readings().is_empty());
        assert!(!service.is_local_degraded());
    }

    #[tokio::test]
    async fn test_unopenable_history_file_starts_degraded() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"plain file").unwrap();
        let config = AppConfig {
            database: DatabaseConfig {
                sqlite_path: Some(blocker.join("history.db").to_string_lossy().into_owned()),
                ..Default::default()
            },
            sync: SyncConfig::default(),
        };

        let (notifier, mut rx) = Notifier::channel();
        let service = create_default_reading_service(&config, Session::anonymous(), notifier).unwrap();
        assert!(service.is_local_degraded());
        assert!(matches!(rx.try_recv().unwrap(), Notice::LocalSaveFailed { .. }));
        let health = crate::health::sync_health(&service);
        assert_eq!(
            health.component("local_store").unwrap().status,
            crate::health::ComponentStatus::Degraded
        );

        // the session still works against the in-memory history
        let pending = service.add_reading(ReadingInput::new("120", "80", "70")).unwrap();
        assert_eq!(service.local_readings(), vec![pending.reading().clone()]);
    }
}

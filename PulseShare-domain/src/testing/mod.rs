// Testing utilities for the domain layer
// This module is only available in tests or when the "mock" feature is enabled

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use pulse_share_data::repository::{InMemoryKeyValueStore, InMemorySharedBackend, KeyValueStore, SharedReadingsBackend};

// Re-export the storage test doubles from the data layer
pub use pulse_share_data::repository::mocks::{FailingKeyValueStore, FlakySharedBackend};

use crate::auth::Session;
use crate::entities::{Reading, ReadingInput, ANONYMOUS};
use crate::notify::{NoticeReceiver, Notifier};
use crate::services::classifier::classify_pressure;
use crate::services::local_store::{LocalStore, DEFAULT_LOCAL_STORE_KEY};
use crate::services::retry::RetryPolicy;
use crate::services::{ReadingService, RemoteSyncClient};

/// A reading service wired to explicit stores, plus its notice receiver
pub fn create_reading_service_with(
    store: Arc<dyn KeyValueStore>,
    backend: Arc<dyn SharedReadingsBackend>,
    session: Session,
    policy: RetryPolicy,
) -> (ReadingService, NoticeReceiver) {
    let (notifier, rx) = Notifier::channel();
    let local = LocalStore::load(store, DEFAULT_LOCAL_STORE_KEY);
    let sync = RemoteSyncClient::new(backend, policy, notifier.clone());
    (ReadingService::new(local, sync, session, notifier), rx)
}

/// A reading service backed entirely by memory, plus its notice receiver
pub fn create_in_memory_reading_service(session: Session) -> (ReadingService, NoticeReceiver) {
    create_reading_service_with(
        Arc::new(InMemoryKeyValueStore::new()),
        Arc::new(InMemorySharedBackend::new()),
        session,
        RetryPolicy::default(),
    )
}

/// Fixed timestamp for deterministic fixtures
pub fn fixed_time(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, minute % 60, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Valid form input with the given vitals
pub fn input(systolic: i32, diastolic: i32, pulse: i32) -> ReadingInput {
    ReadingInput::new(systolic.to_string(), diastolic.to_string(), pulse.to_string()).recorded_at(fixed_time(0))
}

/// A classified anonymous reading
pub fn sample_reading(id: &str, systolic: i32, diastolic: i32, pulse: i32) -> Reading {
    Reading {
        id: id.to_string(),
        systolic,
        diastolic,
        pulse,
        recorded_at: fixed_time(0),
        notes: String::new(),
        subject_name: ANONYMOUS.to_string(),
        age: None,
        gender: None,
        status: Some(classify_pressure(systolic, diastolic).status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_service_round_trip() {
        let (service, _rx) = create_in_memory_reading_service(Session::anonymous());
        let pending = service.add_reading(input(118, 76, 64)).unwrap();
        assert_eq!(pending.reading().recorded_at, fixed_time(0));
        assert!(pending.outcome().await.is_shared());
    }

    #[test]
    fn test_sample_reading_is_classified() {
        let reading = sample_reading("a", 185, 90, 70);
        assert_eq!(reading.status, Some(crate::entities::PressureStatus::Crisis));
    }
}

use std::sync::Arc;

use pulse_share_data::models::StoredReading;
use pulse_share_data::repository::{KeyValueStore, RepositoryError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::entities::conversions;
use crate::entities::Reading;

/// Key the history is stored under unless configured otherwise
pub const DEFAULT_LOCAL_STORE_KEY: &str = "bp-readings";

/// Appended to the history key to name where unreadable data is kept
pub const CORRUPT_KEY_SUFFIX: &str = ".corrupt";

/// Device-local reading history, newest first.
///
/// The in-memory collection is the source of truth for the session. Every
/// mutation writes the whole collection back before returning; a failed write
/// is reported to the caller but the in-memory change is kept.
pub struct LocalStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
    readings: Vec<Reading>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("key", &self.key)
            .field("readings", &self.readings.len())
            .finish()
    }
}

impl LocalStore {
    /// Load the history stored under `key`.
    ///
    /// Never fails. A missing value yields an empty history. Records that
    /// cannot be decoded are skipped and copied to `<key>.corrupt`; a value
    /// that is not a JSON array is copied there whole and the history starts
    /// empty. Either way the data is set aside before the next write.
    pub fn load(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let readings = match read_collection(backend.as_ref(), &key) {
            Ok(readings) => {
                info!("Loaded {} local readings", readings.len());
                readings
            }
            Err(reason) => {
                warn!("Could not load local readings, starting empty: {}", reason);
                Vec::new()
            }
        };

        Self { backend, key, readings }
    }

    /// Current history, newest first
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// Whether a reading with this id is in the history
    pub fn contains(&self, id: &str) -> bool {
        self.readings.iter().any(|r| r.id == id)
    }

    /// Prepend a reading and persist
    pub fn append(&mut self, reading: Reading) -> Result<(), RepositoryError> {
        debug!("Appending local reading {}", reading.id);
        self.readings.insert(0, reading);
        self.persist()
    }

    /// Remove the reading with `id` and persist.
    ///
    /// Returns whether anything was removed; nothing is written when the id
    /// is unknown.
    pub fn remove(&mut self, id: &str) -> Result<bool, RepositoryError> {
        let before = self.readings.len();
        self.readings.retain(|r| r.id != id);
        if self.readings.len() == before {
            debug!("No local reading with id {}", id);
            return Ok(false);
        }

        self.persist()?;
        Ok(true)
    }

    fn persist(&self) -> Result<(), RepositoryError> {
        let records: Vec<StoredReading> = self
            .readings
            .iter()
            .map(conversions::convert_to_stored_reading)
            .collect();
        let value = serde_json::to_string(&records)?;
        self.backend.set(&self.key, &value)
    }
}

fn read_collection(backend: &dyn KeyValueStore, key: &str) -> Result<Vec<Reading>, String> {
    let raw = match backend.get(key).map_err(|e| e.to_string())? {
        Some(raw) => raw,
        None => return Ok(Vec::new()),
    };

    let values: Vec<Value> = match serde_json::from_str(&raw) {
        Ok(values) => values,
        Err(e) => {
            set_aside(backend, key, &raw);
            return Err(e.to_string());
        }
    };

    let mut readings = Vec::with_capacity(values.len());
    let mut rejected = Vec::new();
    for value in values {
        match decode_record(&value) {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                warn!("Skipping unreadable local reading: {}", e);
                rejected.push(value);
            }
        }
    }

    if !rejected.is_empty() {
        match serde_json::to_string(&rejected) {
            Ok(json) => set_aside(backend, key, &json),
            Err(e) => warn!("Could not encode unreadable local readings: {}", e),
        }
    }

    Ok(readings)
}

fn decode_record(value: &Value) -> Result<Reading, String> {
    let stored = StoredReading::deserialize(value).map_err(|e| e.to_string())?;
    conversions::convert_from_stored_reading(stored)
}

// Keep data that failed to load where the next persist cannot overwrite it
fn set_aside(backend: &dyn KeyValueStore, key: &str, raw: &str) {
    let corrupt_key = format!("{}{}", key, CORRUPT_KEY_SUFFIX);
    match backend.set(&corrupt_key, raw) {
        Ok(()) => warn!("Unreadable local data kept under {}", corrupt_key),
        Err(e) => warn!("Could not keep unreadable local data under {}: {}", corrupt_key, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Gender, PressureStatus, ANONYMOUS};
    use chrono::{TimeZone, Utc};
    use pulse_share_data::repository::mocks::FailingKeyValueStore;
    use pulse_share_data::repository::InMemoryKeyValueStore;

    fn reading(id: &str, systolic: i32) -> Reading {
        Reading {
            id: id.to_string(),
            systolic,
            diastolic: 78,
            pulse: 66,
            recorded_at: Utc.with_ymd_and_hms(2024, 1, 9, 6, 30, 15).unwrap(),
            notes: String::new(),
            subject_name: ANONYMOUS.to_string(),
            age: Some(40),
            gender: Some(Gender::Male),
            status: Some(PressureStatus::Normal),
        }
    }

    #[test]
    fn test_missing_value_loads_empty() {
        let store = LocalStore::load(Arc::new(InMemoryKeyValueStore::new()), DEFAULT_LOCAL_STORE_KEY);
        assert!(store.readings().is_empty());
    }

    #[test]
    fn test_malformed_value_loads_empty_and_is_kept() {
        let backend = Arc::new(InMemoryKeyValueStore::with_value(DEFAULT_LOCAL_STORE_KEY, "{not json"));
        let mut store = LocalStore::load(backend.clone(), DEFAULT_LOCAL_STORE_KEY);
        assert!(store.readings().is_empty());

        store.append(reading("a", 110)).unwrap();
        assert_eq!(
            backend.get("bp-readings.corrupt").unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[test]
    fn test_bad_record_does_not_cost_the_rest() {
        let record = |r: Reading| serde_json::to_value(conversions::convert_to_stored_reading(&r)).unwrap();
        let mut bad = record(reading("bad-1", 130));
        bad["date"] = Value::from("Invalid Date");
        let raw = serde_json::to_string(&vec![record(reading("good-1", 118)), bad, record(reading("good-2", 124))]).unwrap();

        let backend = Arc::new(InMemoryKeyValueStore::with_value(DEFAULT_LOCAL_STORE_KEY, &raw));
        let mut store = LocalStore::load(backend.clone(), DEFAULT_LOCAL_STORE_KEY);
        let ids: Vec<_> = store.readings().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["good-1", "good-2"]);

        store.append(reading("new", 121)).unwrap();
        let reloaded = LocalStore::load(backend.clone(), DEFAULT_LOCAL_STORE_KEY);
        assert!(reloaded.contains("good-1"));
        assert!(reloaded.contains("good-2"));
        assert!(reloaded.contains("new"));

        let corrupt = backend.get("bp-readings.corrupt").unwrap().unwrap();
        let kept: Vec<Value> = serde_json::from_str(&corrupt).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["id"], "bad-1");
    }

    #[test]
    fn test_append_prepends_and_persists() {
        let backend = Arc::new(InMemoryKeyValueStore::new());
        let mut store = LocalStore::load(backend.clone(), DEFAULT_LOCAL_STORE_KEY);

        tokio_test::assert_ok!(store.append(reading("a", 110)));
        tokio_test::assert_ok!(store.append(reading("b", 115)));
        let ids: Vec<_> = store.readings().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let reloaded = LocalStore::load(backend, DEFAULT_LOCAL_STORE_KEY);
        assert_eq!(reloaded.readings(), store.readings());
    }

    #[test]
    fn test_remove_only_matching_entry() {
        let backend = Arc::new(InMemoryKeyValueStore::new());
        let mut store = LocalStore::load(backend.clone(), DEFAULT_LOCAL_STORE_KEY);
        store.append(reading("a", 110)).unwrap();
        store.append(reading("b", 115)).unwrap();

        assert!(store.remove("a").unwrap());
        assert!(!store.remove("missing").unwrap());
        assert_eq!(store.readings().len(), 1);
        assert!(store.contains("b"));

        let reloaded = LocalStore::load(backend, DEFAULT_LOCAL_STORE_KEY);
        assert_eq!(reloaded.readings().len(), 1);
    }

    #[test]
    fn test_failed_write_keeps_memory_state() {
        let backend = Arc::new(FailingKeyValueStore::new());
        let mut store = LocalStore::load(backend.clone(), DEFAULT_LOCAL_STORE_KEY);

        let result = store.append(reading("a", 110));
        assert!(matches!(result, Err(RepositoryError::WriteFailed(_))));
        assert_eq!(store.readings().len(), 1);
        assert!(backend.raw(DEFAULT_LOCAL_STORE_KEY).is_none());
    }
}

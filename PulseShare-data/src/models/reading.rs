use serde::{Deserialize, Serialize};

/// Storage model for a reading kept in the device-local collection.
///
/// The whole collection is serialized as a JSON array under a single key.
/// Optional fields tolerate records written by older versions of the app,
/// which may omit them entirely or store `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    /// Unique identifier for the reading
    pub id: String,

    /// Systolic blood pressure (the higher number)
    pub systolic: i32,

    /// Diastolic blood pressure (the lower number)
    pub diastolic: i32,

    /// Pulse rate in beats per minute
    pub pulse: i32,

    /// When the reading was taken, as an RFC 3339 string
    pub date: String,

    /// Free-form notes
    #[serde(default)]
    pub notes: String,

    /// Name of the person the reading belongs to
    #[serde(default)]
    pub name: Option<String>,

    /// Age of the person at the time of the reading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,

    /// Gender label (male, female, other)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    /// Pressure status assigned when the reading was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Insert payload for the shared readings table.
///
/// `shared_at` is not part of the payload; the store assigns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSharedReading {
    /// Identifier shared with the local copy of the reading
    pub id: String,

    /// Systolic blood pressure
    pub systolic: i32,

    /// Diastolic blood pressure
    pub diastolic: i32,

    /// Pulse rate in beats per minute
    pub pulse: i32,

    /// When the reading was taken, as an RFC 3339 string
    pub date: String,

    /// Free-form notes
    pub notes: String,

    /// Resolved subject name
    pub name: String,

    /// Optional age
    pub age: Option<i64>,

    /// Optional gender label
    pub gender: Option<String>,

    /// Pressure status label
    pub status: String,
}

/// A row as returned by the shared readings store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedReadingRow {
    pub id: String,
    pub systolic: i32,
    pub diastolic: i32,
    pub pulse: i32,
    pub date: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub status: Option<String>,

    /// When the store accepted the row (RFC 3339)
    pub shared_at: String,
}

impl SharedReadingRow {
    /// Build the row the store would hold for an accepted insert
    pub fn from_insert(reading: NewSharedReading, shared_at: String) -> Self {
        Self {
            id: reading.id,
            systolic: reading.systolic,
            diastolic: reading.diastolic,
            pulse: reading.pulse,
            date: reading.date,
            notes: Some(reading.notes),
            name: Some(reading.name),
            age: reading.age,
            gender: reading.gender,
            status: Some(reading.status),
            shared_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_reading_tolerates_missing_optional_fields() {
        let json = r#"{
            "id": "a1",
            "systolic": 118,
            "diastolic": 76,
            "pulse": 64,
            "date": "2024-03-01T08:15:00.000Z"
        }"#;

        let reading: StoredReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.notes, "");
        assert!(reading.name.is_none());
        assert!(reading.age.is_none());
        assert!(reading.gender.is_none());
        assert!(reading.status.is_none());
    }

    #[test]
    fn test_stored_reading_accepts_null_age() {
        let json = r#"{"id":"a2","systolic":130,"diastolic":85,"pulse":70,
            "date":"2024-03-01T08:15:00Z","notes":"","name":"Sam","age":null,"gender":""}"#;

        let reading: StoredReading = serde_json::from_str(json).unwrap();
        assert!(reading.age.is_none());
        assert_eq!(reading.gender.as_deref(), Some(""));
    }

    #[test]
    fn test_row_from_insert_keeps_identity() {
        let insert = NewSharedReading {
            id: "r-1".to_string(),
            systolic: 121,
            diastolic: 79,
            pulse: 70,
            date: "2024-03-01T08:15:00Z".to_string(),
            notes: String::new(),
            name: "Anonymous".to_string(),
            age: None,
            gender: None,
            status: "elevated".to_string(),
        };

        let row = SharedReadingRow::from_insert(insert, "2024-03-01T08:16:00Z".to_string());
        assert_eq!(row.id, "r-1");
        assert_eq!(row.status.as_deref(), Some("elevated"));
        assert_eq!(row.shared_at, "2024-03-01T08:16:00Z");
    }
}

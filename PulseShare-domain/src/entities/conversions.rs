use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use pulse_share_data::models::{NewSharedReading, SharedReadingRow, StoredReading};

use crate::entities::reading::{Gender, PressureStatus, Reading, ANONYMOUS};

// Conversion functions between domain entities and data models
// These follow the pattern convert_to_[target]_[model] / convert_from_[source]_[model]

/// Serialize a timestamp the way both stores expect it (ISO 8601, UTC, millis)
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 with any offset, and offset-less date-times which are
/// taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("Invalid timestamp: {}", raw))
}

fn name_or_anonymous(name: Option<String>) -> String {
    name.map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string())
}

fn positive_age(age: Option<i64>) -> Option<u32> {
    age.filter(|a| *a > 0).and_then(|a| u32::try_from(a).ok())
}

/// Convert a domain reading into the local storage record
pub fn convert_to_stored_reading(reading: &Reading) -> StoredReading {
    StoredReading {
        id: reading.id.clone(),
        systolic: reading.systolic,
        diastolic: reading.diastolic,
        pulse: reading.pulse,
        date: format_timestamp(&reading.recorded_at),
        notes: reading.notes.clone(),
        name: Some(reading.subject_name.clone()),
        age: reading.age.map(i64::from),
        gender: reading.gender.map(|g| g.as_str().to_string()),
        status: reading.status.map(|s| s.as_str().to_string()),
    }
}

/// Convert a local storage record back into a domain reading.
///
/// Fails only when the date cannot be parsed; optional fields that are
/// missing or unrecognized become absent.
pub fn convert_from_stored_reading(stored: StoredReading) -> Result<Reading, String> {
    let recorded_at = parse_timestamp(&stored.date)?;

    Ok(Reading {
        id: stored.id,
        systolic: stored.systolic,
        diastolic: stored.diastolic,
        pulse: stored.pulse,
        recorded_at,
        notes: stored.notes,
        subject_name: name_or_anonymous(stored.name),
        age: positive_age(stored.age),
        gender: stored.gender.as_deref().and_then(Gender::from_label),
        status: stored.status.as_deref().and_then(PressureStatus::from_label),
    })
}

/// Convert a domain reading into the insert payload for the shared store
pub fn convert_to_new_shared_reading(reading: &Reading) -> NewSharedReading {
    NewSharedReading {
        id: reading.id.clone(),
        systolic: reading.systolic,
        diastolic: reading.diastolic,
        pulse: reading.pulse,
        date: format_timestamp(&reading.recorded_at),
        notes: reading.notes.clone(),
        name: reading.subject_name.clone(),
        age: reading.age.map(i64::from),
        gender: reading.gender.map(|g| g.as_str().to_string()),
        status: reading.status_or_classify().as_str().to_string(),
    }
}

/// Convert a row from the shared store into a domain reading
pub fn convert_from_shared_row(row: SharedReadingRow) -> Result<Reading, String> {
    let recorded_at = parse_timestamp(&row.date)?;

    Ok(Reading {
        id: row.id,
        systolic: row.systolic,
        diastolic: row.diastolic,
        pulse: row.pulse,
        recorded_at,
        notes: row.notes.unwrap_or_default(),
        subject_name: name_or_anonymous(row.name),
        age: positive_age(row.age),
        gender: row.gender.as_deref().and_then(Gender::from_label),
        status: row.status.as_deref().and_then(PressureStatus::from_label),
    })
}

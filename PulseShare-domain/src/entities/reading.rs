use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::services::classifier::{classify_pressure, classify_pulse, PressureAssessment, PulseAssessment};

/// Subject name used when neither a session nor the form supplies one
pub const ANONYMOUS: &str = "Anonymous";

/// Clinical blood pressure status stored with each reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureStatus {
    Normal,
    Elevated,
    High,
    Crisis,
    Low,
}

impl PressureStatus {
    /// Lowercase label used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            PressureStatus::Normal => "normal",
            PressureStatus::Elevated => "elevated",
            PressureStatus::High => "high",
            PressureStatus::Crisis => "crisis",
            PressureStatus::Low => "low",
        }
    }

    /// Parse a stored label; unknown labels yield `None`
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(PressureStatus::Normal),
            "elevated" => Some(PressureStatus::Elevated),
            "high" => Some(PressureStatus::High),
            "crisis" => Some(PressureStatus::Crisis),
            "low" => Some(PressureStatus::Low),
            _ => None,
        }
    }
}

impl fmt::Display for PressureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pulse rate status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PulseStatus {
    Low,
    Normal,
    High,
}

impl PulseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PulseStatus::Low => "low",
            PulseStatus::Normal => "normal",
            PulseStatus::High => "high",
        }
    }
}

impl fmt::Display for PulseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gender recorded with a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }

    /// Case-insensitive parse; anything unrecognized is treated as absent
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }
}

/// One recorded measurement with its metadata and stored classification.
///
/// Readings are immutable once created. `status` is assigned from the
/// classifier at creation and is never recomputed implicitly; readings
/// loaded from older data may carry no status at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Unique identifier, shared by the local and shared copies
    pub id: String,

    /// Systolic blood pressure in mmHg
    pub systolic: i32,

    /// Diastolic blood pressure in mmHg
    pub diastolic: i32,

    /// Pulse rate in beats per minute
    pub pulse: i32,

    /// When the reading was taken
    pub recorded_at: DateTime<Utc>,

    /// Free-form notes, empty when none were given
    pub notes: String,

    /// Who the reading belongs to
    pub subject_name: String,

    /// Optional age of the subject
    pub age: Option<u32>,

    /// Optional gender of the subject
    pub gender: Option<Gender>,

    /// Classification stored at creation time
    pub status: Option<PressureStatus>,
}

impl Reading {
    /// Classify the vitals again with the current rules.
    ///
    /// Only for callers that explicitly want a fresh assessment; displays of
    /// historical readings should use the stored `status`.
    pub fn classify_now(&self) -> PressureAssessment {
        classify_pressure(self.systolic, self.diastolic)
    }

    /// Pulse assessment for this reading
    pub fn pulse_assessment(&self) -> PulseAssessment {
        classify_pulse(self.pulse)
    }

    /// Stored status, or a fresh one for readings that never had it
    pub fn status_or_classify(&self) -> PressureStatus {
        self.status.unwrap_or_else(|| self.classify_now().status)
    }
}

/// Raw form values as typed by the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingInput {
    pub systolic: String,
    pub diastolic: String,
    pub pulse: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub gender: String,
    /// Defaults to the time of submission
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl ReadingInput {
    /// Input with the three required vitals
    pub fn new(systolic: impl Into<String>, diastolic: impl Into<String>, pulse: impl Into<String>) -> Self {
        Self {
            systolic: systolic.into(),
            diastolic: diastolic.into(),
            pulse: pulse.into(),
            ..Self::default()
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_age(mut self, age: impl Into<String>) -> Self {
        self.age = age.into();
        self
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = gender.into();
        self
    }

    pub fn recorded_at(mut self, at: DateTime<Utc>) -> Self {
        self.recorded_at = Some(at);
        self
    }
}

/// Parsed and range-checked input, ready to become a [`Reading`]
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct ReadingDraft {
    #[validate(range(min = 1, max = 400, message = "Systolic must be between 1 and 400"))]
    pub systolic: i32,

    #[validate(range(min = 1, max = 300, message = "Diastolic must be between 1 and 300"))]
    pub diastolic: i32,

    #[validate(range(min = 1, max = 300, message = "Pulse must be between 1 and 300"))]
    pub pulse: i32,

    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: String,

    /// Name typed into the form, if any
    pub name: Option<String>,

    #[validate(range(min = 1, max = 150, message = "Age must be between 1 and 150"))]
    pub age: Option<u32>,

    pub gender: Option<Gender>,

    pub recorded_at: DateTime<Utc>,
}

impl ReadingDraft {
    /// Parse raw form input. Fails when a vital is missing or not a whole
    /// number, or when a value is out of range.
    pub fn parse(input: ReadingInput) -> Result<Self, String> {
        let draft = ReadingDraft {
            systolic: parse_vital("systolic", &input.systolic)?,
            diastolic: parse_vital("diastolic", &input.diastolic)?,
            pulse: parse_vital("pulse", &input.pulse)?,
            notes: input.notes,
            name: Some(input.name.trim().to_string()).filter(|name| !name.is_empty()),
            age: parse_age(&input.age),
            gender: Gender::from_label(&input.gender),
            recorded_at: input.recorded_at.unwrap_or_else(Utc::now),
        };

        draft.validate().map_err(|errors| describe_validation_errors(&errors))?;
        Ok(draft)
    }

    /// Build the reading once identity, subject and status are decided
    pub fn into_reading(self, id: String, subject_name: String, status: PressureStatus) -> Reading {
        Reading {
            id,
            systolic: self.systolic,
            diastolic: self.diastolic,
            pulse: self.pulse,
            recorded_at: self.recorded_at,
            notes: self.notes,
            subject_name,
            age: self.age,
            gender: self.gender,
            status: Some(status),
        }
    }
}

fn parse_vital(field: &str, raw: &str) -> Result<i32, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(format!("{} is required", field));
    }
    trimmed
        .parse::<i32>()
        .map_err(|_| format!("{}: '{}' is not a whole number", field, trimmed))
}

/// Empty, non-numeric and zero ages mean "not given"
fn parse_age(raw: &str) -> Option<u32> {
    let age = raw.trim().parse::<i64>().ok()?;
    if age <= 0 {
        return None;
    }
    Some(u32::try_from(age).unwrap_or(u32::MAX))
}

fn describe_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errors)| {
            let error_msgs: Vec<String> = errors
                .iter()
                .map(|err| match &err.message {
                    Some(msg) => msg.to_string(),
                    None => format!("Invalid {}", field),
                })
                .collect();
            format!("{}: {}", field, error_msgs.join(", "))
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

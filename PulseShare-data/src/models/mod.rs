// Data storage models
pub mod reading;

pub use reading::{NewSharedReading, SharedReadingRow, StoredReading};

/// Table that holds the shared readings unless configured otherwise
pub const DEFAULT_SHARED_TABLE: &str = "shared_bp_readings";

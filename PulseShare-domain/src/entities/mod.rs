pub mod conversions;
pub mod reading;

pub use reading::{Gender, PressureStatus, PulseStatus, Reading, ReadingDraft, ReadingInput, ANONYMOUS};

use crate::entities::{PressureStatus, PulseStatus};

/// Finer-grained category behind a [`PressureStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PressureCategory {
    HypertensiveCrisis,
    Hypertension2,
    Hypertension1,
    Elevated,
    Normal,
    Low,
    /// Combinations no range above captured; reported as elevated
    Unclassified,
}

impl PressureCategory {
    /// Stored status for this category
    pub fn status(&self) -> PressureStatus {
        match self {
            PressureCategory::HypertensiveCrisis => PressureStatus::Crisis,
            PressureCategory::Hypertension2 | PressureCategory::Hypertension1 => PressureStatus::High,
            PressureCategory::Elevated | PressureCategory::Unclassified => PressureStatus::Elevated,
            PressureCategory::Normal => PressureStatus::Normal,
            PressureCategory::Low => PressureStatus::Low,
        }
    }

    /// Advice shown with the category
    pub fn message(&self) -> &'static str {
        match self {
            PressureCategory::HypertensiveCrisis => {
                "You may be experiencing a hypertensive crisis. Seek immediate medical attention if you also have chest pain, shortness of breath, back pain, numbness, vision changes or difficulty speaking."
            }
            PressureCategory::Hypertension2 => {
                "Your blood pressure is high (Stage 2 Hypertension). Lifestyle changes are urgent and medication is likely needed. Consult your doctor promptly."
            }
            PressureCategory::Hypertension1 => {
                "Your blood pressure is high (Stage 1 Hypertension). Cut down on sodium and alcohol, exercise regularly and talk to your doctor about whether medication is needed."
            }
            PressureCategory::Elevated => {
                "Your blood pressure is elevated. Focus on lifestyle changes such as less sodium, regular exercise and stress management."
            }
            PressureCategory::Normal => {
                "Your blood pressure is normal. Keep up healthy habits like regular exercise, a balanced diet and enough sleep."
            }
            PressureCategory::Low => {
                "Your blood pressure is low. Stay hydrated, eat small frequent meals and stand up slowly. See your doctor if you feel dizzy or faint."
            }
            PressureCategory::Unclassified => {
                "Your blood pressure needs attention. Please ask your healthcare provider for a proper assessment."
            }
        }
    }
}

/// Result of classifying a blood pressure pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureAssessment {
    pub status: PressureStatus,
    pub category: PressureCategory,
    pub message: &'static str,
}

/// Result of classifying a pulse rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseAssessment {
    pub status: PulseStatus,
    pub message: &'static str,
}

/// Categorize a systolic/diastolic pair.
///
/// Rules are checked in order and the first match wins, so overlapping
/// ranges resolve to the more severe category.
pub fn categorize_pressure(systolic: i32, diastolic: i32) -> PressureCategory {
    if systolic >= 180 || diastolic >= 120 {
        PressureCategory::HypertensiveCrisis
    } else if systolic >= 140 || diastolic >= 90 {
        PressureCategory::Hypertension2
    } else if (130..=139).contains(&systolic) || (80..=89).contains(&diastolic) {
        PressureCategory::Hypertension1
    } else if systolic > 120 && systolic < 130 && diastolic < 80 {
        PressureCategory::Elevated
    } else if systolic <= 120 && diastolic <= 80 {
        PressureCategory::Normal
    } else if systolic < 90 || diastolic < 60 {
        PressureCategory::Low
    } else {
        PressureCategory::Unclassified
    }
}

/// Classify a blood pressure pair into a status and its advice
pub fn classify_pressure(systolic: i32, diastolic: i32) -> PressureAssessment {
    let category = categorize_pressure(systolic, diastolic);
    PressureAssessment {
        status: category.status(),
        category,
        message: category.message(),
    }
}

/// Classify a pulse rate
pub fn classify_pulse(pulse: i32) -> PulseAssessment {
    if pulse < 60 {
        PulseAssessment {
            status: PulseStatus::Low,
            message: "Your pulse rate is low. That can be normal for athletes, but see your doctor if you feel dizzy, tired or short of breath.",
        }
    } else if pulse <= 100 {
        PulseAssessment {
            status: PulseStatus::Normal,
            message: "Your pulse rate is normal. Regular exercise and managing stress help keep your heart rate healthy.",
        }
    } else {
        PulseAssessment {
            status: PulseStatus::High,
            message: "Your pulse rate is high. Reduce caffeine and alcohol, try deep breathing and consult your doctor if it persists.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crisis() {
        assert_eq!(classify_pressure(180, 70).status, PressureStatus::Crisis);
        assert_eq!(classify_pressure(110, 120).status, PressureStatus::Crisis);
        assert_eq!(categorize_pressure(250, 150), PressureCategory::HypertensiveCrisis);
    }

    #[test]
    fn test_hypertension_stage_2() {
        assert_eq!(categorize_pressure(150, 70), PressureCategory::Hypertension2);
        assert_eq!(categorize_pressure(179, 119), PressureCategory::Hypertension2);
        assert_eq!(categorize_pressure(100, 90), PressureCategory::Hypertension2);
        assert_eq!(classify_pressure(150, 70).status, PressureStatus::High);
    }

    #[test]
    fn test_hypertension_stage_1() {
        assert_eq!(categorize_pressure(135, 70), PressureCategory::Hypertension1);
        assert_eq!(categorize_pressure(139, 79), PressureCategory::Hypertension1);
        // diastolic 80..=89 wins over any systolic below 140
        assert_eq!(categorize_pressure(120, 80), PressureCategory::Hypertension1);
        assert_eq!(categorize_pressure(125, 85), PressureCategory::Hypertension1);
        assert_eq!(classify_pressure(135, 70).status, PressureStatus::High);
    }

    #[test]
    fn test_elevated() {
        let assessment = classify_pressure(125, 70);
        assert_eq!(assessment.category, PressureCategory::Elevated);
        assert_eq!(assessment.status, PressureStatus::Elevated);
        assert_eq!(categorize_pressure(121, 79), PressureCategory::Elevated);
        assert_eq!(categorize_pressure(129, 0), PressureCategory::Elevated);
    }

    #[test]
    fn test_normal() {
        assert_eq!(categorize_pressure(120, 79), PressureCategory::Normal);
        assert_eq!(categorize_pressure(110, 75), PressureCategory::Normal);
        // low vitals are caught by the normal rule before the low rule
        assert_eq!(categorize_pressure(85, 70), PressureCategory::Normal);
        assert_eq!(categorize_pressure(85, 55), PressureCategory::Normal);
    }

    #[test]
    fn test_every_pair_gets_exactly_one_category() {
        for systolic in -10..=260 {
            for diastolic in -10..=160 {
                let first = classify_pressure(systolic, diastolic);
                let second = classify_pressure(systolic, diastolic);
                assert_eq!(first, second);
                assert_eq!(first.status, first.category.status());
                assert_eq!(first.message, first.category.message());
            }
        }
    }

    #[test]
    fn test_pulse_boundaries() {
        assert_eq!(classify_pulse(59).status, PulseStatus::Low);
        assert_eq!(classify_pulse(60).status, PulseStatus::Normal);
        assert_eq!(classify_pulse(100).status, PulseStatus::Normal);
        assert_eq!(classify_pulse(101).status, PulseStatus::High);
        assert_eq!(classify_pulse(-5).status, PulseStatus::Low);
    }

    #[test]
    fn test_messages_are_distinct() {
        let categories = [
            PressureCategory::HypertensiveCrisis,
            PressureCategory::Hypertension2,
            PressureCategory::Hypertension1,
            PressureCategory::Elevated,
            PressureCategory::Normal,
            PressureCategory::Low,
            PressureCategory::Unclassified,
        ];
        let messages: std::collections::HashSet<_> = categories.iter().map(|c| c.message()).collect();
        assert_eq!(messages.len(), categories.len());
    }
}

use std::collections::HashSet;

use crate::entities::{Gender, PressureStatus, PulseStatus, Reading, ANONYMOUS};

/// Summary of a newest-first list of readings
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingSummary {
    pub latest: Reading,
    /// Status of the latest reading as stored
    pub latest_status: PressureStatus,
    pub avg_systolic: i32,
    pub avg_diastolic: i32,
    pub avg_pulse: i32,
    pub count: usize,
}

/// Name, age and gender last used for a subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownSubject {
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
}

fn rounded_average(values: impl Iterator<Item = i32>, count: usize) -> i32 {
    let sum: i64 = values.map(i64::from).sum();
    (sum as f64 / count as f64 + 0.5).floor() as i32
}

/// Latest reading plus rounded averages; `None` for an empty list
pub fn summarize(readings: &[Reading]) -> Option<ReadingSummary> {
    let latest = readings.first()?.clone();
    let count = readings.len();

    Some(ReadingSummary {
        latest_status: latest.status_or_classify(),
        avg_systolic: rounded_average(readings.iter().map(|r| r.systolic), count),
        avg_diastolic: rounded_average(readings.iter().map(|r| r.diastolic), count),
        avg_pulse: rounded_average(readings.iter().map(|r| r.pulse), count),
        count,
        latest,
    })
}

/// Advice for a reading, based on its pressure and pulse categories and the
/// subject's age and gender
pub fn health_tips(reading: &Reading) -> Vec<&'static str> {
    let pressure = reading.status_or_classify();
    let pulse = reading.pulse_assessment().status;
    let elderly = reading.age.is_some_and(|age| age > 65);
    let young = reading.age.is_some_and(|age| age < 30);
    let female = reading.gender == Some(Gender::Female);
    let male = reading.gender == Some(Gender::Male);

    if pressure == PressureStatus::Normal && pulse == PulseStatus::Normal {
        let mut tips = vec![
            "Keep eating a balanced diet with plenty of fruits and vegetables",
            "Keep up at least 30 minutes of physical activity a day",
            "Aim for 7-9 hours of restful sleep",
            "Practice stress management such as meditation",
        ];
        if elderly {
            tips.push("Annual health checkups are especially important at your age");
        }
        return tips;
    }

    let mut tips = match pressure {
        PressureStatus::Crisis => {
            return vec![
                "Seek immediate medical attention if you have a severe headache, chest pain, vision problems or difficulty breathing",
                "Sit down and try to stay calm while you wait for help",
                "Do not drive yourself to the hospital",
                "If your doctor prescribed emergency blood pressure medication, take it as directed",
                "This is a medical emergency that needs immediate professional treatment",
            ];
        }
        PressureStatus::Low => {
            let mut tips = vec![
                "Stay hydrated by drinking plenty of water",
                "Eat smaller, more frequent meals",
                "Limit alcohol",
                "Stand up slowly to avoid dizziness",
                "Ask your doctor whether you should add more salt to your diet",
            ];
            if female {
                tips.push("Low blood pressure can be related to hormonal changes; consider discussing it with your doctor");
            }
            if elderly {
                tips.push("At your age low blood pressure needs careful monitoring; consult your doctor");
            }
            tips
        }
        PressureStatus::Elevated => {
            let mut tips = vec![
                "Keep sodium below 1,500mg a day",
                "Get at least 150 minutes of physical activity a week",
                "Follow the DASH diet (fruits, vegetables, whole grains)",
                "Limit alcohol and avoid smoking",
                "Practice stress reduction techniques",
            ];
            if male && !young {
                tips.push("Men over 30 have a higher risk of hypertension; consider monitoring more often");
            }
            if elderly {
                tips.push("Ask your doctor about lifestyle changes suited to your age");
            }
            tips
        }
        PressureStatus::High => {
            let mut tips = vec![
                "Keep sodium below 1,500mg a day",
                "Get at least 150 minutes of physical activity a week",
                "Follow the DASH diet (fruits, vegetables, whole grains)",
                "Limit alcohol and avoid smoking",
                "Ask your doctor about medication options",
                "Monitor your blood pressure regularly",
            ];
            if male && !young {
                tips.push("Men over 30 have a higher risk of serious hypertension; consult your doctor");
            }
            if elderly {
                tips.push("Ask your doctor about medication suited to older patients");
            }
            tips
        }
        PressureStatus::Normal => Vec::new(),
    };

    match pulse {
        PulseStatus::Low => {
            tips.push("Watch for symptoms like fatigue or dizziness");
            tips.push("Talk to your doctor if you take heart medication");
            if elderly {
                tips.push("A low pulse in older people may need special attention; consult your doctor");
            }
        }
        PulseStatus::High => {
            tips.push("Reduce caffeine and other stimulants");
            tips.push("Practice deep breathing exercises");
            tips.push("Make sure you stay hydrated");
            if young {
                tips.push("In young adults a fast heart rate can come from stress or anxiety; try relaxation techniques");
            }
        }
        PulseStatus::Normal => {}
    }

    tips
}

/// One-line description of whom a reading belongs to
pub fn describe_subject(reading: &Reading) -> String {
    let mut description = format!("For {}", reading.subject_name);
    if let Some(age) = reading.age {
        description.push_str(&format!(", {} years old", age));
    }
    if let Some(gender) = reading.gender {
        description.push_str(&format!(", {}", gender.as_str()));
    }
    description
}

/// Named subjects in a newest-first list, each with the age and gender of
/// their most recent reading
pub fn known_subjects(readings: &[Reading]) -> Vec<KnownSubject> {
    let mut seen = HashSet::new();
    readings
        .iter()
        .filter(|r| r.subject_name != ANONYMOUS && !r.subject_name.trim().is_empty())
        .filter(|r| seen.insert(r.subject_name.clone()))
        .map(|r| KnownSubject {
            name: r.subject_name.clone(),
            age: r.age,
            gender: r.gender,
        })
        .collect()
}

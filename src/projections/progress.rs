use crate::events::{DomainEvent, EventKind};
use crate::projections::round_half_up;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    pub course_id: String,
    pub percent_complete: u32,
    pub current_lesson_id: Option<String>,
    pub next_lesson_id: Option<String>,
    /// In order of first completion.
    pub completed_lesson_ids: Vec<String>,
    /// Serialized as `""` when there is no activity.
    #[serde(default, with = "timestamp_or_empty")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp_or_empty")]
    pub last_activity_at: Option<DateTime<Utc>>,
}

mod timestamp_or_empty {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => at.serialize(serializer),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

impl CourseProgress {
    fn apply_event(&mut self, ev: &DomainEvent, seen: &mut HashSet<String>) {
        let in_course = match &ev.kind {
            EventKind::LessonCompleted(p) => {
                if p.course_id.as_deref() != Some(self.course_id.as_str()) {
                    return;
                }
                if seen.insert(p.lesson_id.clone()) {
                    self.completed_lesson_ids.push(p.lesson_id.clone());
                }
                true
            }
            EventKind::AttemptSubmitted(p) => p.course_id.as_deref() == Some(self.course_id.as_str()),
            _ => false,
        };
        if !in_course {
            return;
        }
        self.started_at = Some(match self.started_at {
            Some(t) if t <= ev.timestamp => t,
            _ => ev.timestamp,
        });
        self.last_activity_at = Some(match self.last_activity_at {
            Some(t) if t >= ev.timestamp => t,
            _ => ev.timestamp,
        });
    }
}

pub fn project_course_progress<S: AsRef<str>>(
    events: &[DomainEvent],
    course_id: &str,
    lesson_order: &[S],
) -> CourseProgress {
    let mut progress = CourseProgress {
        course_id: course_id.to_string(),
        ..CourseProgress::default()
    };
    let mut completed = HashSet::new();
    for ev in events {
        progress.apply_event(ev, &mut completed);
    }

    let current_idx = lesson_order
        .iter()
        .position(|l| !completed.contains(l.as_ref()));
    progress.current_lesson_id = current_idx.map(|i| lesson_order[i].as_ref().to_string());
    progress.next_lesson_id = current_idx
        .and_then(|i| lesson_order.get(i + 1))
        .map(|l| l.as_ref().to_string());

    progress.percent_complete = if lesson_order.is_empty() {
        0
    } else if progress.current_lesson_id.is_none() {
        100
    } else {
        let done = completed.len().min(lesson_order.len()) as f64;
        round_half_up(done / lesson_order.len() as f64 * 100.0).clamp(0, 100) as u32
    };
    progress
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MasteryLevel {
    Novice,
    Competent,
    Expert,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkillMastery {
    pub skill_id: String,
    pub mastery_level: MasteryLevel,
    pub courses_completed: usize,
    pub total_courses: usize,
}

const COMPETENT_RATIO: f64 = 0.33;

pub fn project_skill_mastery<S: AsRef<str>>(
    skill_id: &str,
    course_ids: &[S],
    course_progress: &HashMap<String, CourseProgress>,
) -> SkillMastery {
    let total_courses = course_ids.len();
    let courses_completed = course_ids
        .iter()
        .filter(|id| {
            course_progress
                .get(id.as_ref())
                .is_some_and(|p| p.percent_complete == 100)
        })
        .count();
    let ratio = if total_courses == 0 {
        0.0
    } else {
        courses_completed as f64 / total_courses as f64
    };
    let mastery_level = if ratio >= 1.0 {
        MasteryLevel::Expert
    } else if ratio >= COMPETENT_RATIO {
        MasteryLevel::Competent
    } else {
        MasteryLevel::Novice
    };
    SkillMastery {
        skill_id: skill_id.to_string(),
        mastery_level,
        courses_completed,
        total_courses,
    }
}

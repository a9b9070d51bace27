use crate::content::version::LessonVersion;
use crate::events::{ConfidenceReason, DomainEvent, EventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const HINT_DEPENDENCY_THRESHOLD: u32 = 2;
pub const STALE_RISK_PRIORITY: u32 = 5;
pub const REGRESSION_PRIORITY: u32 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PracticeReason {
    HintDependent,
    StaleRisk,
    Regression,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PracticeItem {
    pub lesson_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    pub reason: PracticeReason,
    pub priority: u32,
}

/// Practice queue with regression entries keyed by the event's `cuId`.
pub fn project_practice_queue(
    events: &[DomainEvent],
    published_lessons: &[LessonVersion],
    now: DateTime<Utc>,
) -> Vec<PracticeItem> {
    project_practice_queue_with(events, published_lessons, now, |cu_id| cu_id.to_string())
}

/// Merges hint dependency, stale content and regressions into one list,
/// highest priority first.
///
/// `regression_key` maps a regressed unit's `cuId` to the lesson key used in
/// the queue. A lesson-level signal never adds a second entry for a lesson:
/// stale-risk skips queued lessons, and a regression raises the lesson's
/// first entry to regression priority unless it already ranks higher.
/// Equal priorities keep insertion order: hint entries by first hint, then
/// stale lessons in `published_lessons` order, then regressions in event
/// order.
pub fn project_practice_queue_with(
    events: &[DomainEvent],
    published_lessons: &[LessonVersion],
    now: DateTime<Utc>,
    regression_key: impl Fn(&str) -> String,
) -> Vec<PracticeItem> {
    let mut hint_keys: Vec<(String, String)> = Vec::new();
    let mut hint_counts: HashMap<(String, String), u32> = HashMap::new();
    for ev in events {
        if let EventKind::HintRevealed(h) = &ev.kind {
            let key = (h.lesson_id.clone(), h.block_id.clone());
            let count = hint_counts.entry(key.clone()).or_insert(0);
            if *count == 0 {
                hint_keys.push(key);
            }
            *count += 1;
        }
    }

    let mut queue: Vec<PracticeItem> = hint_keys
        .into_iter()
        .filter_map(|key| {
            let count = hint_counts.get(&key).copied().unwrap_or(0);
            (count >= HINT_DEPENDENCY_THRESHOLD).then(|| PracticeItem {
                lesson_id: key.0,
                block_id: Some(key.1),
                reason: PracticeReason::HintDependent,
                priority: count,
            })
        })
        .collect();

    let mut queued_lessons: HashSet<String> =
        queue.iter().map(|item| item.lesson_id.clone()).collect();
    for version in published_lessons {
        let stale = version.stale_after.is_some_and(|at| now > at);
        if stale && queued_lessons.insert(version.lesson_id.clone()) {
            queue.push(PracticeItem {
                lesson_id: version.lesson_id.clone(),
                block_id: None,
                reason: PracticeReason::StaleRisk,
                priority: STALE_RISK_PRIORITY,
            });
        }
    }

    for ev in events {
        if let EventKind::ConfidenceUpdated(c) = &ev.kind
            && c.reason == ConfidenceReason::Regression
        {
            let lesson_id = regression_key(&c.cu_id);
            match queue.iter_mut().find(|item| item.lesson_id == lesson_id) {
                Some(existing) => {
                    if existing.priority < REGRESSION_PRIORITY {
                        existing.reason = PracticeReason::Regression;
                        existing.priority = REGRESSION_PRIORITY;
                    }
                }
                None => queue.push(PracticeItem {
                    lesson_id,
                    block_id: None,
                    reason: PracticeReason::Regression,
                    priority: REGRESSION_PRIORITY,
                }),
            }
        }
    }

    queue.sort_by(|a, b| b.priority.cmp(&a.priority));
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::fixtures::sample_lesson;
    use crate::content::version::SourceProvider;
    use crate::events::{ConfidenceUpdated, HintRevealed};

    fn now() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    fn hint(lesson: &str, block: &str, idx: u32) -> DomainEvent {
        DomainEvent::new(
            format!("hint-{lesson}-{block}-{idx}"),
            "user-1",
            now(),
            EventKind::HintRevealed(HintRevealed {
                lesson_id: lesson.to_string(),
                block_id: block.to_string(),
                hint_index: idx,
            }),
        )
    }

    fn regression(cu: &str) -> DomainEvent {
        DomainEvent::new(
            format!("reg-{cu}"),
            "user-1",
            now(),
            EventKind::ConfidenceUpdated(ConfidenceUpdated {
                cu_id: cu.to_string(),
                delta: -0.05,
                reason: ConfidenceReason::Regression,
            }),
        )
    }

    fn published(lesson: &str, stale_after: &str) -> LessonVersion {
        let mut v = LessonVersion::new(
            format!("v-{lesson}"),
            sample_lesson(lesson),
            "run-1",
            now(),
            SourceProvider::ManualSeed,
        );
        v.stale_after = Some(stale_after.parse().unwrap());
        v
    }

    #[test]
    fn two_hints_on_a_block_queue_it() {
        let q = project_practice_queue(&[hint("l1", "b1", 0), hint("l1", "b1", 1)], &[], now());
        assert_eq!(
            q,
            vec![PracticeItem {
                lesson_id: "l1".to_string(),
                block_id: Some("b1".to_string()),
                reason: PracticeReason::HintDependent,
                priority: 2,
            }]
        );
    }

    #[test]
    fn single_hint_is_not_enough() {
        let q = project_practice_queue(&[hint("l2", "b1", 0), hint("l2", "b2", 0)], &[], now());
        assert!(q.is_empty());
    }

    #[test]
    fn stale_published_lessons_are_queued() {
        let q = project_practice_queue(
            &[],
            &[
                published("stale", "2025-01-01T00:00:00Z"),
                published("fresh", "2027-01-01T00:00:00Z"),
            ],
            now(),
        );
        assert_eq!(q.len(), 1);
        assert_eq!(q[0].lesson_id, "stale");
        assert_eq!(q[0].reason, PracticeReason::StaleRisk);
        assert_eq!(q[0].priority, STALE_RISK_PRIORITY);
    }

    #[test]
    fn stale_risk_does_not_duplicate_a_hint_entry() {
        let events: Vec<DomainEvent> = (0..7).map(|i| hint("l1", "b1", i)).collect();
        let q = project_practice_queue(&events, &[published("l1", "2025-01-01T00:00:00Z")], now());
        assert_eq!(q.len(), 1);
        assert_eq!(q[0].reason, PracticeReason::HintDependent);
        assert_eq!(q[0].priority, 7);
    }

    #[test]
    fn regression_uses_cu_id_as_lesson_key() {
        let q = project_practice_queue(&[regression("cu-9"), regression("cu-9")], &[], now());
        assert_eq!(q.len(), 1);
        assert_eq!(q[0].lesson_id, "cu-9");
        assert_eq!(q[0].reason, PracticeReason::Regression);
        assert_eq!(q[0].priority, REGRESSION_PRIORITY);
    }

    #[test]
    fn regression_raises_an_existing_entry_instead_of_duplicating_it() {
        let q = project_practice_queue(
            &[regression("l1")],
            &[published("l1", "2025-01-01T00:00:00Z")],
            now(),
        );
        assert_eq!(
            q,
            vec![PracticeItem {
                lesson_id: "l1".to_string(),
                block_id: None,
                reason: PracticeReason::Regression,
                priority: REGRESSION_PRIORITY,
            }]
        );

        let mut events: Vec<DomainEvent> = (0..3).map(|i| hint("l2", "b1", i)).collect();
        events.push(regression("l2"));
        let q = project_practice_queue(&events, &[], now());
        assert_eq!(q.len(), 1);
        assert_eq!(q[0].block_id.as_deref(), Some("b1"));
        assert_eq!(q[0].reason, PracticeReason::Regression);
        assert_eq!(q[0].priority, REGRESSION_PRIORITY);
    }

    #[test]
    fn heavy_hint_dependence_outranks_a_regression_on_the_same_lesson() {
        let mut events: Vec<DomainEvent> = (0..12).map(|i| hint("l1", "b1", i)).collect();
        events.push(regression("l1"));
        let q = project_practice_queue(&events, &[], now());
        assert_eq!(q.len(), 1);
        assert_eq!(q[0].reason, PracticeReason::HintDependent);
        assert_eq!(q[0].priority, 12);
    }

    #[test]
    fn regression_key_can_be_supplied() {
        let q = project_practice_queue_with(&[regression("cu-9")], &[], now(), |cu| {
            format!("lesson-for-{cu}")
        });
        assert_eq!(q[0].lesson_id, "lesson-for-cu-9");
    }

    #[test]
    fn sorted_by_priority_descending() {
        let mut events: Vec<DomainEvent> = (0..3).map(|i| hint("l1", "b1", i)).collect();
        events.push(regression("cu-1"));
        let q = project_practice_queue(&events, &[published("l2", "2025-01-01T00:00:00Z")], now());
        let priorities: Vec<u32> = q.iter().map(|i| i.priority).collect();
        assert_eq!(priorities, vec![10, 5, 3]);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let events = vec![
            hint("l-b", "b1", 0),
            hint("l-a", "b1", 0),
            hint("l-a", "b1", 1),
            hint("l-b", "b1", 1),
            hint("l-c", "b1", 0),
            hint("l-c", "b1", 1),
            hint("l-c", "b1", 2),
            hint("l-c", "b1", 3),
            hint("l-c", "b1", 4),
        ];
        let q = project_practice_queue(
            &events,
            &[
                published("stale-z", "2025-01-01T00:00:00Z"),
                published("stale-y", "2025-01-01T00:00:00Z"),
            ],
            now(),
        );
        let order: Vec<(&str, u32)> = q.iter().map(|i| (i.lesson_id.as_str(), i.priority)).collect();
        assert_eq!(
            order,
            vec![("l-c", 5), ("stale-z", 5), ("stale-y", 5), ("l-b", 2), ("l-a", 2)]
        );
    }
}

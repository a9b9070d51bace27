#![allow(dead_code)]

use chrono::{DateTime, Utc};
use learnio::content::LessonSpec;
use learnio::events::DomainEvent;
use serde_json::json;

pub fn ts(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

pub fn lesson(id: &str) -> LessonSpec {
    serde_json::from_value(json!({
        "id": id,
        "schemaVersion": "1.0.0",
        "version": "1",
        "title": "Ownership basics",
        "topic": "Rust ownership",
        "description": "Moves, borrows and clones",
        "difficulty": "beginner",
        "estimatedDuration": 15,
        "tags": ["rust"],
        "capabilityIds": ["cap-own"],
        "cuIds": ["cu-own"],
        "stages": {
            "plan": {"blocks": [
                {"id": "p1", "type": "prediction", "prompt": "What does `let b = a;` do to `a`?"}
            ]},
            "do": {"blocks": [
                {"id": "d1", "type": "exercise", "prompt": "Fix the use-after-move",
                 "hints": ["Look at line 2", "Borrow instead"],
                 "remediationTargets": ["move-is-copy"]}
            ]},
            "check": {"blocks": [
                {"id": "c1", "type": "quiz", "question": "Which line fails?",
                 "options": [{"id": "a", "text": "line 3", "isCorrect": true}]}
            ]},
            "act": {"blocks": [
                {"id": "a1", "type": "reflection", "prompt": "When would you clone?"}
            ]}
        },
        "citations": [{"id": "cite-1", "text": "The Rust Book, ch. 4"}]
    }))
    .unwrap()
}

pub fn event(id: &str, at: &str, kind: serde_json::Value) -> DomainEvent {
    let mut raw = kind;
    raw["id"] = json!(id);
    raw["timestamp"] = json!(at);
    raw["userId"] = json!("learner-1");
    serde_json::from_value(raw).unwrap()
}

pub fn completed(id: &str, course: &str, lesson: &str, at: &str) -> DomainEvent {
    event(
        id,
        at,
        json!({"type": "LessonCompleted", "payload": {"courseId": course, "lessonId": lesson}}),
    )
}

pub fn hint(id: &str, lesson: &str, block: &str, index: u32, at: &str) -> DomainEvent {
    event(
        id,
        at,
        json!({"type": "HintRevealed", "payload": {"lessonId": lesson, "blockId": block, "hintIndex": index}}),
    )
}

pub fn regression(id: &str, cu: &str, at: &str) -> DomainEvent {
    event(
        id,
        at,
        json!({"type": "ConfidenceUpdated", "payload": {"cuId": cu, "delta": -0.05, "reason": "regression"}}),
    )
}

pub fn mixed_history() -> Vec<DomainEvent> {
    vec![
        completed("e1", "rust-101", "l1", "2026-01-01T09:00:00Z"),
        hint("e2", "l2", "d1", 0, "2026-01-01T09:05:00Z"),
        hint("e3", "l2", "d1", 1, "2026-01-01T09:06:00Z"),
        hint("e4", "l2", "d1", 2, "2026-01-01T09:07:00Z"),
        regression("e5", "cu-own", "2026-01-01T09:10:00Z"),
        completed("e6", "rust-101", "l2", "2026-01-01T10:00:00Z"),
        completed("e7", "rust-201", "l9", "2026-01-01T11:00:00Z"),
    ]
}

pub fn kinds(events: &[DomainEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.event_type()).collect()
}

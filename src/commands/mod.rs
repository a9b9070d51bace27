//! Command handlers: learner input in, domain events out.
//!
//! Handlers never read or write the event log; the caller appends what they
//! return.

use crate::events::{
    AttemptSubmitted, ConfidenceReason, ConfidenceUpdated, CuLoopClosed, DomainEvent, EventKind,
};
use crate::pdca::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

const BASE_DELTA_HUNDREDTHS: i64 = 5;
const MIN_DELTA_HUNDREDTHS: i64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub skill_id: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub lesson_id: Option<String>,
    pub cu_id: String,
    #[serde(default)]
    pub block_id: Option<String>,
    pub stage: Stage,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
    #[serde(default)]
    pub result: Option<AttemptResult>,
    #[serde(default)]
    pub hints_used: u32,
    #[serde(default)]
    pub misconception_tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptResult {
    pub correct: bool,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Confidence gained when a loop closes: 0.05 minus 0.01 per hint, floored
/// at 0.01.
pub fn confidence_delta(hints_used: u32) -> f64 {
    let hundredths = (BASE_DELTA_HUNDREDTHS - i64::from(hints_used)).max(MIN_DELTA_HUNDREDTHS);
    hundredths as f64 / 100.0
}

pub fn submit_attempt_command(attempt: &Attempt) -> Vec<DomainEvent> {
    submit_attempt_command_at(attempt, Utc::now())
}

/// Like [`submit_attempt_command`] with an explicit event timestamp.
pub fn submit_attempt_command_at(attempt: &Attempt, now: DateTime<Utc>) -> Vec<DomainEvent> {
    let batch = Uuid::new_v4().simple().to_string();
    let event_id = |n: u8| format!("evt-{batch}-{n}");

    let mut events = vec![DomainEvent::new(
        event_id(1),
        &attempt.user_id,
        now,
        EventKind::AttemptSubmitted(AttemptSubmitted {
            cu_id: attempt.cu_id.clone(),
            skill_id: attempt.skill_id.clone(),
            course_id: attempt.course_id.clone(),
            lesson_id: attempt.lesson_id.clone(),
            block_id: attempt.block_id.clone(),
            stage: attempt.stage,
            inputs: attempt.inputs.clone(),
        }),
    )];

    if attempt.stage == Stage::Act {
        let reason = if attempt.hints_used > 0 {
            ConfidenceReason::HintPenalty
        } else {
            ConfidenceReason::LoopClosed
        };
        events.push(DomainEvent::new(
            event_id(2),
            &attempt.user_id,
            now,
            EventKind::ConfidenceUpdated(ConfidenceUpdated {
                cu_id: attempt.cu_id.clone(),
                delta: confidence_delta(attempt.hints_used),
                reason,
            }),
        ));
        events.push(DomainEvent::new(
            event_id(3),
            &attempt.user_id,
            now,
            EventKind::CuLoopClosed(CuLoopClosed {
                cu_id: attempt.cu_id.clone(),
                evidence_gained: true,
            }),
        ));
    }

    events
}

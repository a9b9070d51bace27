pub mod store;

use crate::pdca::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An immutable learner or content fact. Never mutated once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum EventKind {
    AttemptSubmitted(AttemptSubmitted),
    StageCompleted(StageCompleted),
    #[serde(rename = "CULoopClosed")]
    CuLoopClosed(CuLoopClosed),
    EvidenceGained(EvidenceGained),
    TransferTestPassed(TransferTestPassed),
    ConfidenceUpdated(ConfidenceUpdated),
    BlockInteracted(BlockInteracted),
    HintRevealed(HintRevealed),
    LessonCompleted(LessonCompleted),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSubmitted {
    pub cu_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    pub stage: Stage,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageCompleted {
    pub cu_id: String,
    pub stage: Stage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CuLoopClosed {
    pub cu_id: String,
    pub evidence_gained: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceGained {
    pub cu_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferTestPassed {
    pub cu_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceReason {
    TransferPass,
    HintPenalty,
    Regression,
    SpacedRecall,
    LoopClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceUpdated {
    pub cu_id: String,
    pub delta: f64,
    pub reason: ConfidenceReason,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockInteracted {
    pub lesson_id: String,
    pub block_id: String,
    #[serde(default)]
    pub interaction: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HintRevealed {
    pub lesson_id: String,
    pub block_id: String,
    pub hint_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonCompleted {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    pub lesson_id: String,
}

impl EventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::AttemptSubmitted(_) => "AttemptSubmitted",
            EventKind::StageCompleted(_) => "StageCompleted",
            EventKind::CuLoopClosed(_) => "CULoopClosed",
            EventKind::EvidenceGained(_) => "EvidenceGained",
            EventKind::TransferTestPassed(_) => "TransferTestPassed",
            EventKind::ConfidenceUpdated(_) => "ConfidenceUpdated",
            EventKind::BlockInteracted(_) => "BlockInteracted",
            EventKind::HintRevealed(_) => "HintRevealed",
            EventKind::LessonCompleted(_) => "LessonCompleted",
        }
    }
}

impl DomainEvent {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        kind: EventKind,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp,
            user_id: user_id.into(),
            kind,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.type_name()
    }
}

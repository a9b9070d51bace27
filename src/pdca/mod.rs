//! Plan-Do-Check-Act loop for a single learning unit.
//!
//! `reduce` is a guarded reducer: an action whose guard fails returns the
//! state unchanged rather than an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Plan,
    Do,
    Check,
    Act,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Plan, Stage::Do, Stage::Check, Stage::Act];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Do => "do",
            Stage::Check => "check",
            Stage::Act => "act",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "plan" => Ok(Stage::Plan),
            "do" => Ok(Stage::Do),
            "check" => Ok(Stage::Check),
            "act" => Ok(Stage::Act),
            other => Err(format!("unknown stage `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Locked,
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageBoard {
    pub plan: StageStatus,
    pub r#do: StageStatus,
    pub check: StageStatus,
    pub act: StageStatus,
}

impl StageBoard {
    pub fn get(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Plan => self.plan,
            Stage::Do => self.r#do,
            Stage::Check => self.check,
            Stage::Act => self.act,
        }
    }

    fn set(&mut self, stage: Stage, status: StageStatus) {
        match stage {
            Stage::Plan => self.plan = status,
            Stage::Do => self.r#do = status,
            Stage::Check => self.check = status,
            Stage::Act => self.act = status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PdcaState {
    pub current_stage: Stage,
    pub stages: StageBoard,
    pub prediction: String,
    pub diagnosis: String,
    pub reflection: String,
}

impl Default for PdcaState {
    fn default() -> Self {
        Self {
            current_stage: Stage::Plan,
            stages: StageBoard {
                plan: StageStatus::Active,
                r#do: StageStatus::Locked,
                check: StageStatus::Locked,
                act: StageStatus::Locked,
            },
            prediction: String::new(),
            diagnosis: String::new(),
            reflection: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PdcaAction {
    UpdatePrediction(String),
    CommitPrediction,
    SubmitDiagnosis(String),
    CompleteCheck,
    UpdateReflection(String),
    CloseLoop,
    JumpToStage(Stage),
    // Analytics actions: routed through the reducer, no state change.
    #[serde(rename_all = "camelCase")]
    BlockInteracted {
        block_id: String,
        interaction: Value,
    },
    #[serde(rename_all = "camelCase")]
    HintRevealed {
        block_id: String,
        hint_index: u32,
    },
    #[serde(rename_all = "camelCase")]
    LessonCompleted {
        skill_id: Option<String>,
        course_id: Option<String>,
        lesson_id: String,
    },
}

impl PdcaState {
    pub fn initial() -> Self {
        Self::default()
    }

    pub fn replay<'a>(actions: impl IntoIterator<Item = &'a PdcaAction>) -> Self {
        actions.into_iter().fold(Self::initial(), reduce)
    }

    pub fn is_terminal(&self) -> bool {
        Stage::ALL
            .iter()
            .all(|s| self.stages.get(*s) == StageStatus::Completed)
    }

    /// Moves `from` to completed and `to` to active, making `to` current.
    fn advance(mut self, from: Stage, to: Stage) -> Self {
        self.stages.set(from, StageStatus::Completed);
        self.stages.set(to, StageStatus::Active);
        self.current_stage = to;
        self
    }
}

pub fn reduce(state: PdcaState, action: &PdcaAction) -> PdcaState {
    match action {
        PdcaAction::UpdatePrediction(text) => PdcaState {
            prediction: text.clone(),
            ..state
        },
        PdcaAction::CommitPrediction => {
            if state.stages.plan != StageStatus::Active || state.prediction.trim().is_empty() {
                return state;
            }
            state.advance(Stage::Plan, Stage::Do)
        }
        PdcaAction::SubmitDiagnosis(text) => {
            if state.stages.r#do != StageStatus::Active {
                return state;
            }
            let state = PdcaState {
                diagnosis: text.clone(),
                ..state
            };
            state.advance(Stage::Do, Stage::Check)
        }
        PdcaAction::CompleteCheck => {
            if state.stages.check != StageStatus::Active {
                return state;
            }
            state.advance(Stage::Check, Stage::Act)
        }
        PdcaAction::UpdateReflection(text) => PdcaState {
            reflection: text.clone(),
            ..state
        },
        PdcaAction::CloseLoop => {
            if state.stages.act != StageStatus::Active {
                return state;
            }
            let mut state = state;
            state.stages.set(Stage::Act, StageStatus::Completed);
            state
        }
        PdcaAction::JumpToStage(target) => {
            if state.stages.get(*target) == StageStatus::Locked {
                return state;
            }
            PdcaState {
                current_stage: *target,
                ..state
            }
        }
        PdcaAction::BlockInteracted { .. }
        | PdcaAction::HintRevealed { .. }
        | PdcaAction::LessonCompleted { .. } => state,
    }
}

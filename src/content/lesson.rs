use crate::error::{Error, Result};
use crate::pdca::Stage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const LESSON_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonSpec {
    pub id: String,
    pub schema_version: String,
    pub version: String,
    pub title: String,
    pub topic: String,
    pub description: String,
    pub difficulty: Difficulty,
    /// Minutes.
    pub estimated_duration: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub capability_ids: Vec<String>,
    #[serde(default)]
    pub cu_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisites: Option<Vec<String>>,
    pub stages: LessonStages,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<SpecProvenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LessonStages {
    pub plan: StageContent,
    pub r#do: StageContent,
    pub check: StageContent,
    pub act: StageContent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageContent {
    pub blocks: Vec<LessonBlock>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpecProvenance {
    pub generator_model: String,
    pub prompt_bundle_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_run_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonBlock {
    pub id: String,
    /// Misconception tags this block remediates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_targets: Option<Vec<String>>,
    #[serde(flatten)]
    pub body: BlockBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlockBody {
    #[serde(rename_all = "camelCase")]
    Explainer {
        markdown: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        asset_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Diagram {
        diagram_type: DiagramType,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Scenario {
        title: String,
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        asset_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Prediction {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        placeholder: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correct_answer_reveal: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Exercise {
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        /// Hint ladder, revealed in order.
        hints: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        solution: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validation: Option<ExerciseValidation>,
    },
    Quiz {
        question: String,
        options: Vec<QuizOption>,
    },
    Reflection {
        prompt: String,
    },
    Todo {
        text: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagramType {
    Mermaid,
    Svg,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExerciseValidation {
    #[serde(rename = "type")]
    pub kind: ValidationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationKind {
    Regex,
    Llm,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizOption {
    pub id: String,
    pub text: String,
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl LessonStages {
    pub fn get(&self, stage: Stage) -> &StageContent {
        match stage {
            Stage::Plan => &self.plan,
            Stage::Do => &self.r#do,
            Stage::Check => &self.check,
            Stage::Act => &self.act,
        }
    }

    pub fn get_mut(&mut self, stage: Stage) -> &mut StageContent {
        match stage {
            Stage::Plan => &mut self.plan,
            Stage::Do => &mut self.r#do,
            Stage::Check => &mut self.check,
            Stage::Act => &mut self.act,
        }
    }
}

impl LessonSpec {
    /// Blocks across all four stages in plan, do, check, act order.
    pub fn blocks(&self) -> impl Iterator<Item = (Stage, &LessonBlock)> {
        Stage::ALL
            .into_iter()
            .flat_map(move |stage| self.stages.get(stage).blocks.iter().map(move |b| (stage, b)))
    }

    pub fn find_block(&self, block_id: &str) -> Option<&LessonBlock> {
        self.blocks().map(|(_, b)| b).find(|b| b.id == block_id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("lesson spec id must not be blank"));
        }
        if self.schema_version != LESSON_SCHEMA_VERSION {
            return Err(Error::validation(format!(
                "lesson '{}' has unsupported schemaVersion '{}'; expected '{LESSON_SCHEMA_VERSION}'",
                self.id, self.schema_version
            )));
        }
        if self.estimated_duration < 1 {
            return Err(Error::validation(format!(
                "lesson '{}' estimatedDuration must be at least 1 minute",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for (stage, block) in self.blocks() {
            if !seen.insert(block.id.as_str()) {
                return Err(Error::validation(format!(
                    "lesson '{}' has duplicate block id '{}' (in {stage})",
                    self.id, block.id
                )));
            }
        }
        Ok(())
    }
}

impl LessonBlock {
    pub fn hint_ladder(&self) -> &[String] {
        match &self.body {
            BlockBody::Exercise { hints, .. } => hints,
            _ => &[],
        }
    }
}

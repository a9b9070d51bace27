pub mod simulated;
pub mod staged;
pub mod transitions;

use crate::content::lesson::LessonSpec;
use crate::content::version::LessonVersion;
use crate::pdca::Stage;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use simulated::SimulatedCompiler;
pub use staged::{CompileOutcome, StagedContentCompiler};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CompilerPhase {
    Brief,
    Skeleton,
    Blocks,
    Validate,
    Package,
}

impl CompilerPhase {
    pub const ALL: [CompilerPhase; 5] = [
        CompilerPhase::Brief,
        CompilerPhase::Skeleton,
        CompilerPhase::Blocks,
        CompilerPhase::Validate,
        CompilerPhase::Package,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CompilerPhase::Brief => "brief",
            CompilerPhase::Skeleton => "skeleton",
            CompilerPhase::Blocks => "blocks",
            CompilerPhase::Validate => "validate",
            CompilerPhase::Package => "package",
        }
    }
}

impl fmt::Display for CompilerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CompilerPhase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        CompilerPhase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown compiler phase `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunArtifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<ResearchBrief>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<LessonSkeleton>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_lesson: Option<LessonSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

impl RunArtifacts {
    pub fn is_complete(&self) -> bool {
        self.brief.is_some()
            && self.skeleton.is_some()
            && self.draft_lesson.is_some()
            && self.validation.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunProvenance {
    pub model: String,
    pub prompt_bundle_version: String,
}

/// One execution of the staged content pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompilerRun {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub topic: String,
    /// `None` until the first phase starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<CompilerPhase>,
    pub status: RunStatus,
    #[serde(default)]
    pub artifacts: RunArtifacts,
    pub provenance: RunProvenance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResearchBrief {
    pub topic: String,
    pub objectives: Vec<String>,
    pub misconceptions: Vec<String>,
    pub key_terms: Vec<String>,
    pub sources: Vec<BriefSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BriefSource {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonSkeleton {
    pub pdca_structure: PdcaStructure,
    pub block_outline: Vec<BlockOutline>,
}

/// What happens in each stage, in prose.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PdcaStructure {
    pub plan: String,
    pub r#do: String,
    pub check: String,
    pub act: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockOutline {
    pub stage: Stage,
    #[serde(rename = "type")]
    pub block_type: String,
    pub goal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// 0.0..=1.0
    pub citation_coverage: f64,
}

/// External content generator driven phase by phase by the staged compiler.
#[async_trait]
pub trait ContentCompiler: Send + Sync {
    async fn generate_research_brief(&self, topic: &str) -> Result<ResearchBrief>;
    async fn generate_skeleton(&self, brief: &ResearchBrief) -> Result<LessonSkeleton>;
    async fn author_blocks(
        &self,
        skeleton: &LessonSkeleton,
        brief: &ResearchBrief,
    ) -> Result<LessonSpec>;
    async fn validate_lesson(&self, lesson: &LessonSpec) -> Result<ValidationReport>;
    async fn package_lesson_version(&self, lesson: &LessonSpec, run_id: &str)
    -> Result<LessonVersion>;
}

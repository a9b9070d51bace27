use crate::content::lesson::LessonSpec;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REFRESH_POLICY_DAYS: u32 = 90;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceProvider {
    MockLlm,
    Perplexity,
    ManualSeed,
}

/// Immutable, content-hashed snapshot of a lesson under a stable `lesson_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonVersion {
    pub id: String,
    pub lesson_id: String,
    pub spec: LessonSpec,
    pub compiler_run_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Stamped by the store on save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_hash: Option<String>,
    pub source_provider: SourceProvider,
    #[serde(default = "default_refresh_policy_days")]
    pub refresh_policy_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

fn default_refresh_policy_days() -> u32 {
    DEFAULT_REFRESH_POLICY_DAYS
}

impl LessonVersion {
    /// A fresh, unsaved version with the default refresh policy.
    pub fn new(
        id: impl Into<String>,
        spec: LessonSpec,
        compiler_run_id: impl Into<String>,
        created_at: DateTime<Utc>,
        source_provider: SourceProvider,
    ) -> Self {
        Self {
            id: id.into(),
            lesson_id: spec.id.clone(),
            spec,
            compiler_run_id: compiler_run_id.into(),
            created_at,
            published_at: None,
            spec_hash: None,
            source_provider,
            refresh_policy_days: DEFAULT_REFRESH_POLICY_DAYS,
            stale_after: None,
            generated_at: None,
        }
    }

    pub fn with_refresh_policy(mut self, days: u32) -> Self {
        self.refresh_policy_days = days;
        self
    }

    /// `created_at + refresh_policy_days`.
    pub fn policy_stale_after(&self) -> DateTime<Utc> {
        self.created_at + Duration::days(i64::from(self.refresh_policy_days))
    }
}

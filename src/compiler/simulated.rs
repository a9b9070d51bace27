use crate::compiler::{
    BlockOutline, BriefSource, CompilerPhase, ContentCompiler, LessonSkeleton, PdcaStructure,
    ResearchBrief, ValidationReport,
};
use crate::content::lesson::{
    BlockBody, Citation, Difficulty, LESSON_SCHEMA_VERSION, LessonBlock, LessonSpec,
    LessonStages, QuizOption, StageContent,
};
use crate::content::version::{LessonVersion, SourceProvider};
use crate::pdca::Stage;
use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

/// Offline collaborator. Lesson content depends only on the topic.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCompiler {
    fail_at: Option<CompilerPhase>,
    delay: Option<Duration>,
}

impl SimulatedCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the collaborator call for `phase`.
    pub fn fail_at(mut self, phase: CompilerPhase) -> Self {
        self.fail_at = Some(phase);
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn enter(&self, phase: CompilerPhase) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at == Some(phase) {
            bail!("simulated failure in {phase} phase");
        }
        Ok(())
    }
}

fn slug(topic: &str) -> String {
    let mut out = String::new();
    for c in topic.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}

fn block(id: String, body: BlockBody) -> LessonBlock {
    LessonBlock {
        id,
        remediation_targets: None,
        body,
    }
}

#[async_trait]
impl ContentCompiler for SimulatedCompiler {
    async fn generate_research_brief(&self, topic: &str) -> Result<ResearchBrief> {
        self.enter(CompilerPhase::Brief).await?;
        Ok(ResearchBrief {
            topic: topic.to_string(),
            objectives: vec![
                format!("Explain the core idea of {topic}"),
                format!("Apply {topic} to a small problem"),
                "Verify understanding against a prediction".to_string(),
            ],
            misconceptions: vec![format!("{topic} works the same as in other languages")],
            key_terms: vec![topic.to_string()],
            sources: vec![BriefSource {
                id: "src-1".to_string(),
                title: format!("{topic}: reference notes"),
                url: None,
                snippet: Some(format!("Key points about {topic}.")),
            }],
        })
    }

    async fn generate_skeleton(&self, brief: &ResearchBrief) -> Result<LessonSkeleton> {
        self.enter(CompilerPhase::Skeleton).await?;
        let outline = |stage, block_type: &str, goal: &str| BlockOutline {
            stage,
            block_type: block_type.to_string(),
            goal: goal.to_string(),
        };
        Ok(LessonSkeleton {
            pdca_structure: PdcaStructure {
                plan: format!("Introduce {} and predict an outcome", brief.topic),
                r#do: "Work through a guided exercise".to_string(),
                check: "Compare the result with the prediction".to_string(),
                act: "Reflect and plan the next step".to_string(),
            },
            block_outline: vec![
                outline(Stage::Plan, "explainer", "Introduce the concept"),
                outline(Stage::Do, "exercise", "Practice"),
                outline(Stage::Check, "quiz", "Verify"),
                outline(Stage::Act, "reflection", "Transfer"),
            ],
        })
    }

    async fn author_blocks(
        &self,
        _skeleton: &LessonSkeleton,
        brief: &ResearchBrief,
    ) -> Result<LessonSpec> {
        self.enter(CompilerPhase::Blocks).await?;
        let id = format!("lesson-{}", slug(&brief.topic));
        let topic = &brief.topic;

        let mut exercise = block(
            format!("{id}-do-1"),
            BlockBody::Exercise {
                prompt: format!("Use {topic} to solve the starter problem."),
                initial_code: None,
                language: None,
                hints: vec![
                    "Re-read the explainer.".to_string(),
                    "Compare with your prediction.".to_string(),
                ],
                solution: None,
                validation: None,
            },
        );
        exercise.remediation_targets = Some(brief.misconceptions.clone());

        Ok(LessonSpec {
            id: id.clone(),
            schema_version: LESSON_SCHEMA_VERSION.to_string(),
            version: "1".to_string(),
            title: format!("Mastering {topic}"),
            topic: topic.clone(),
            description: format!("Generated lesson for {topic}"),
            difficulty: Difficulty::Beginner,
            estimated_duration: 20,
            tags: brief.key_terms.clone(),
            capability_ids: Vec::new(),
            cu_ids: vec![format!("cu-{}", slug(topic))],
            prerequisites: None,
            stages: LessonStages {
                plan: StageContent {
                    blocks: vec![block(
                        format!("{id}-plan-1"),
                        BlockBody::Explainer {
                            markdown: brief.objectives.join("\n"),
                            asset_id: None,
                        },
                    )],
                },
                r#do: StageContent {
                    blocks: vec![exercise],
                },
                check: StageContent {
                    blocks: vec![block(
                        format!("{id}-check-1"),
                        BlockBody::Quiz {
                            question: format!("Which statement about {topic} is true?"),
                            options: vec![
                                QuizOption {
                                    id: "a".to_string(),
                                    text: brief.objectives.first().cloned().unwrap_or_default(),
                                    is_correct: true,
                                    feedback: None,
                                },
                                QuizOption {
                                    id: "b".to_string(),
                                    text: brief.misconceptions.first().cloned().unwrap_or_default(),
                                    is_correct: false,
                                    feedback: Some("That is a common misconception.".to_string()),
                                },
                            ],
                        },
                    )],
                },
                act: StageContent {
                    blocks: vec![block(
                        format!("{id}-act-1"),
                        BlockBody::Reflection {
                            prompt: format!("Where else would {topic} help you?"),
                        },
                    )],
                },
            },
            // Stamped by the staged compiler from the run's provenance.
            provenance: None,
            citations: Some(
                brief
                    .sources
                    .iter()
                    .map(|s| Citation {
                        id: s.id.clone(),
                        text: s.title.clone(),
                        url: s.url.clone(),
                        source_id: Some(s.id.clone()),
                    })
                    .collect(),
            ),
        })
    }

    async fn validate_lesson(&self, lesson: &LessonSpec) -> Result<ValidationReport> {
        self.enter(CompilerPhase::Validate).await?;
        let errors = match lesson.validate() {
            Ok(()) => Vec::new(),
            Err(err) => vec![err.to_string()],
        };
        let cited = lesson.citations.as_ref().is_some_and(|c| !c.is_empty());
        let warnings = if cited {
            Vec::new()
        } else {
            vec!["lesson has no citations".to_string()]
        };
        Ok(ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            citation_coverage: if cited { 1.0 } else { 0.0 },
        })
    }

    async fn package_lesson_version(
        &self,
        lesson: &LessonSpec,
        run_id: &str,
    ) -> Result<LessonVersion> {
        self.enter(CompilerPhase::Package).await?;
        Ok(LessonVersion::new(
            format!("ver-{}-{run_id}", lesson.id),
            lesson.clone(),
            run_id,
            Utc::now(),
            SourceProvider::MockLlm,
        ))
    }
}

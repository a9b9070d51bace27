use crate::compiler::{
    CompilerPhase, CompilerRun, ContentCompiler, LessonSkeleton, ResearchBrief, RunArtifacts,
    RunProvenance, RunStatus,
};
use crate::content::lesson::{LessonSpec, SpecProvenance};
use crate::content::version::LessonVersion;
use crate::error::Error;
use anyhow::anyhow;
use chrono::Utc;
use futures::Stream;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_MODEL: &str = "mock-llm-v1";
pub const DEFAULT_PROMPT_BUNDLE_VERSION: &str = "v1.0.0";

/// Called once with the terminal run, completed or failed.
pub type RunRecorder = Box<dyn Fn(&CompilerRun) + Send + Sync>;

/// Drives a [`ContentCompiler`] through brief, skeleton, blocks, validate and
/// package, producing a [`CompilerRun`] snapshot before and after each call.
pub struct StagedContentCompiler {
    compiler: Arc<dyn ContentCompiler>,
    model: String,
    prompt_bundle_version: String,
    on_run_saved: Option<RunRecorder>,
}

/// Everything a drained pipeline produced.
#[derive(Debug)]
pub struct CompileOutcome {
    pub snapshots: Vec<CompilerRun>,
    pub final_run: CompilerRun,
    /// Set when the package phase succeeded.
    pub lesson_version: Option<LessonVersion>,
    /// The rejected collaborator call, as an [`Error::PipelineStep`].
    pub error: Option<Error>,
}

impl CompileOutcome {
    pub fn succeeded(&self) -> bool {
        self.final_run.status == RunStatus::Completed
    }
}

impl StagedContentCompiler {
    pub fn new(compiler: Arc<dyn ContentCompiler>) -> Self {
        Self {
            compiler,
            model: DEFAULT_MODEL.to_string(),
            prompt_bundle_version: DEFAULT_PROMPT_BUNDLE_VERSION.to_string(),
            on_run_saved: None,
        }
    }

    pub fn with_provenance(
        mut self,
        model: impl Into<String>,
        prompt_bundle_version: impl Into<String>,
    ) -> Self {
        self.model = model.into();
        self.prompt_bundle_version = prompt_bundle_version.into();
        self
    }

    pub fn on_run_saved(mut self, recorder: impl Fn(&CompilerRun) + Send + Sync + 'static) -> Self {
        self.on_run_saved = Some(Box::new(recorder));
        self
    }

    /// Lazily yields snapshots. No phase starts until the consumer asks for
    /// the snapshot that follows it; dropping the stream starts nothing new.
    /// Dropping it while a collaborator call is pending drops that call's
    /// future too.
    pub fn compile(&self, topic: &str) -> impl Stream<Item = CompilerRun> + '_ {
        futures::stream::unfold(self.pipeline(topic), |mut pipeline| async move {
            let snapshot = pipeline.advance().await?;
            Some((snapshot, pipeline))
        })
    }

    /// Drains every snapshot and returns them with the terminal run.
    pub async fn run_full(&self, topic: &str) -> CompileOutcome {
        let mut pipeline = self.pipeline(topic);
        let mut snapshots = Vec::new();
        while let Some(snapshot) = pipeline.advance().await {
            snapshots.push(snapshot);
        }
        let final_run = snapshots
            .last()
            .cloned()
            .unwrap_or_else(|| pipeline.run.clone());
        CompileOutcome {
            snapshots,
            final_run,
            lesson_version: pipeline.lesson_version,
            error: pipeline.error,
        }
    }

    fn pipeline(&self, topic: &str) -> Pipeline<'_> {
        let run = CompilerRun {
            id: format!("run-{}", Uuid::new_v4().simple()),
            timestamp: Utc::now(),
            topic: topic.to_string(),
            phase: None,
            status: RunStatus::Pending,
            artifacts: RunArtifacts::default(),
            provenance: RunProvenance {
                model: self.model.clone(),
                prompt_bundle_version: self.prompt_bundle_version.clone(),
            },
        };
        info!(run_id = %run.id, topic, "compile started");
        Pipeline {
            compiler: self.compiler.as_ref(),
            recorder: self.on_run_saved.as_ref(),
            run,
            step: Step::Announce(CompilerPhase::Brief),
            lesson_version: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    /// Emit the `running` snapshot for this phase.
    Announce(CompilerPhase),
    /// Call the collaborator for this phase.
    Invoke(CompilerPhase),
    Done,
}

struct Pipeline<'a> {
    compiler: &'a dyn ContentCompiler,
    recorder: Option<&'a RunRecorder>,
    run: CompilerRun,
    step: Step,
    lesson_version: Option<LessonVersion>,
    error: Option<Error>,
}

impl Pipeline<'_> {
    async fn advance(&mut self) -> Option<CompilerRun> {
        match self.step {
            Step::Announce(phase) => {
                self.run.phase = Some(phase);
                self.run.status = RunStatus::Running;
                self.step = Step::Invoke(phase);
                debug!(run_id = %self.run.id, %phase, "phase running");
            }
            Step::Invoke(phase) => match self.invoke(phase).await {
                Ok(()) => match next_phase(phase) {
                    Some(next) => self.step = Step::Announce(next),
                    None => {
                        self.run.status = RunStatus::Completed;
                        self.finish();
                        info!(run_id = %self.run.id, "compile completed");
                    }
                },
                Err(err) => {
                    warn!(run_id = %self.run.id, %phase, error = %err, "compile phase failed");
                    self.run.status = RunStatus::Failed;
                    self.error = Some(Error::PipelineStep {
                        phase: phase.to_string(),
                        message: format!("{err:#}"),
                    });
                    self.finish();
                }
            },
            Step::Done => return None,
        }
        Some(self.run.clone())
    }

    fn finish(&mut self) {
        self.step = Step::Done;
        if let Some(recorder) = self.recorder {
            recorder(&self.run);
        }
    }

    async fn invoke(&mut self, phase: CompilerPhase) -> anyhow::Result<()> {
        let artifacts = &mut self.run.artifacts;
        match phase {
            CompilerPhase::Brief => {
                artifacts.brief = Some(self.compiler.generate_research_brief(&self.run.topic).await?);
            }
            CompilerPhase::Skeleton => {
                let brief = require(&artifacts.brief, "research brief")?;
                artifacts.skeleton = Some(self.compiler.generate_skeleton(brief).await?);
            }
            CompilerPhase::Blocks => {
                let skeleton: &LessonSkeleton = require(&artifacts.skeleton, "skeleton")?;
                let brief: &ResearchBrief = require(&artifacts.brief, "research brief")?;
                let mut draft = self.compiler.author_blocks(skeleton, brief).await?;
                if draft.provenance.is_none() {
                    draft.provenance = Some(SpecProvenance {
                        generator_model: self.run.provenance.model.clone(),
                        prompt_bundle_version: self.run.provenance.prompt_bundle_version.clone(),
                        research_run_id: Some(self.run.id.clone()),
                    });
                }
                artifacts.draft_lesson = Some(draft);
            }
            CompilerPhase::Validate => {
                let draft: &LessonSpec = require(&artifacts.draft_lesson, "draft lesson")?;
                artifacts.validation = Some(self.compiler.validate_lesson(draft).await?);
            }
            CompilerPhase::Package => {
                let draft = require(&artifacts.draft_lesson, "draft lesson")?;
                let version = self
                    .compiler
                    .package_lesson_version(draft, &self.run.id)
                    .await?;
                self.lesson_version = Some(version);
            }
        }
        Ok(())
    }
}

fn require<'a, T>(slot: &'a Option<T>, what: &str) -> anyhow::Result<&'a T> {
    slot.as_ref()
        .ok_or_else(|| anyhow!("{what} missing from earlier phase"))
}

fn next_phase(phase: CompilerPhase) -> Option<CompilerPhase> {
    let idx = CompilerPhase::ALL.iter().position(|p| *p == phase)?;
    CompilerPhase::ALL.get(idx + 1).copied()
}

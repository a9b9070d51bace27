//! Command implementations behind the CLI. Each one opens the workspace
//! stores, does its work, and prints a short report.

use crate::commands::{Attempt, AttemptResult, submit_attempt_command};
use crate::compiler::{CompilerPhase, CompilerRun, SimulatedCompiler, StagedContentCompiler};
use crate::config::{ProjectConfig, default_state_db, load_project_config};
use crate::content::{ContentStore, LessonSpec};
use crate::events::store::EventLog;
use crate::events::{DomainEvent, EventKind, HintRevealed, LessonCompleted};
use crate::pdca::Stage;
use crate::projections::{
    CourseProgress, project_course_progress, project_practice_queue, project_skill_mastery,
    project_staleness_report,
};
use crate::storage::{KeyValueStore, SqliteKv};
use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Open stores for one project root.
pub struct Workspace {
    pub config: ProjectConfig,
    pub state_db: PathBuf,
    pub events: EventLog,
    pub content: ContentStore,
}

impl Workspace {
    /// Flags win over `.learnio/config.toml`, which wins over defaults.
    /// Relative paths from the config resolve against `root`.
    pub fn open(root: &Path, state_db: Option<PathBuf>, log: Option<PathBuf>) -> Result<Self> {
        let config = load_project_config(root)?.unwrap_or_else(|| ProjectConfig {
            version: 1,
            ..ProjectConfig::default()
        });
        let state_db = state_db
            .or_else(|| config.storage.state_db.as_ref().map(|p| root.join(p)))
            .unwrap_or_else(default_state_db);
        let mirror = log.or_else(|| config.logging.ndjson.as_ref().map(|p| root.join(p)));

        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKv::open(&state_db)?);
        let events = EventLog::open(kv.clone())
            .with_context(|| format!("load event log from {}", state_db.display()))?
            .with_mirror(mirror);
        let content = ContentStore::open(kv)
            .with_context(|| format!("load content store from {}", state_db.display()))?;
        Ok(Self {
            config,
            state_db,
            events,
            content,
        })
    }

    fn open_cwd(state_db: Option<PathBuf>, log: Option<PathBuf>) -> Result<Self> {
        let root = std::env::current_dir().context("resolve current directory")?;
        Self::open(&root, state_db, log)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn now_or(at: Option<DateTime<Utc>>) -> DateTime<Utc> {
    at.unwrap_or_else(Utc::now)
}

/// `COURSE=LESSON,LESSON,...`
pub fn parse_course_spec(raw: &str) -> Result<(String, Vec<String>)> {
    let (course, lessons) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected COURSE=LESSON[,LESSON...], got `{raw}`"))?;
    let course = course.trim();
    if course.is_empty() {
        bail!("course id is empty in `{raw}`");
    }
    Ok((course.to_string(), split_list(lessons)))
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct AttemptCommand {
    pub user: String,
    pub cu: String,
    pub stage: Stage,
    pub skill: Option<String>,
    pub course: Option<String>,
    pub lesson: Option<String>,
    pub block: Option<String>,
    pub inputs: Option<String>,
    pub correct: Option<bool>,
    pub hints: u32,
    pub misconceptions: Vec<String>,
    pub state_db: Option<PathBuf>,
    pub log: Option<PathBuf>,
}

impl AttemptCommand {
    pub fn into_attempt(self, now: DateTime<Utc>) -> Result<Attempt> {
        let inputs: BTreeMap<String, Value> = match self.inputs.as_deref() {
            Some(raw) => serde_json::from_str(raw).context("parse --inputs as a JSON object")?,
            None => BTreeMap::new(),
        };
        Ok(Attempt {
            id: format!("att-{}", Uuid::new_v4().simple()),
            user_id: self.user,
            skill_id: self.skill,
            course_id: self.course,
            lesson_id: self.lesson,
            cu_id: self.cu,
            block_id: self.block,
            stage: self.stage,
            inputs,
            result: self.correct.map(|correct| AttemptResult {
                correct,
                score: None,
            }),
            hints_used: self.hints,
            misconception_tags: self.misconceptions,
            timestamp: now,
        })
    }
}

pub fn record_attempt(cmd: AttemptCommand) -> Result<()> {
    let mut ws = Workspace::open_cwd(cmd.state_db.clone(), cmd.log.clone())?;
    let attempt = cmd.into_attempt(Utc::now())?;
    let events = submit_attempt_command(&attempt);
    for ev in &events {
        println!("{} {}", ev.id, ev.event_type());
    }
    ws.events.append(events)?;
    Ok(())
}

pub fn record_hint(
    user: &str,
    lesson: &str,
    block: &str,
    index: u32,
    state_db: Option<PathBuf>,
    log: Option<PathBuf>,
) -> Result<()> {
    let mut ws = Workspace::open_cwd(state_db, log)?;
    let ev = DomainEvent::new(
        format!("evt-{}", Uuid::new_v4().simple()),
        user,
        Utc::now(),
        EventKind::HintRevealed(HintRevealed {
            lesson_id: lesson.to_string(),
            block_id: block.to_string(),
            hint_index: index,
        }),
    );
    println!("{} {}", ev.id, ev.event_type());
    ws.events.append([ev])?;
    Ok(())
}

pub fn record_completion(
    user: &str,
    lesson: &str,
    course: Option<String>,
    skill: Option<String>,
    state_db: Option<PathBuf>,
    log: Option<PathBuf>,
) -> Result<()> {
    let mut ws = Workspace::open_cwd(state_db, log)?;
    let ev = DomainEvent::new(
        format!("evt-{}", Uuid::new_v4().simple()),
        user,
        Utc::now(),
        EventKind::LessonCompleted(LessonCompleted {
            skill_id: skill,
            course_id: course,
            lesson_id: lesson.to_string(),
        }),
    );
    println!("{} {}", ev.id, ev.event_type());
    ws.events.append([ev])?;
    Ok(())
}

pub fn list_events(user: Option<&str>, state_db: Option<PathBuf>) -> Result<()> {
    let ws = Workspace::open_cwd(state_db, None)?;
    let events = ws
        .events
        .list_filtered(|ev| user.is_none_or(|u| ev.user_id == u));
    if events.is_empty() {
        println!("No events in {}", ws.state_db.display());
        return Ok(());
    }
    for ev in events {
        println!("{}", serde_json::to_string(&ev)?);
    }
    Ok(())
}

pub fn show_progress(course: &str, lessons: &[String], state_db: Option<PathBuf>) -> Result<()> {
    let ws = Workspace::open_cwd(state_db, None)?;
    print_json(&project_course_progress(ws.events.list(), course, lessons))
}

pub fn show_mastery(skill: &str, courses: &[String], state_db: Option<PathBuf>) -> Result<()> {
    let ws = Workspace::open_cwd(state_db, None)?;
    let specs = courses
        .iter()
        .map(|raw| parse_course_spec(raw))
        .collect::<Result<Vec<_>>>()?;
    let progress: HashMap<String, CourseProgress> = specs
        .iter()
        .map(|(course, lessons)| {
            (
                course.clone(),
                project_course_progress(ws.events.list(), course, lessons),
            )
        })
        .collect();
    let course_ids: Vec<&str> = specs.iter().map(|(c, _)| c.as_str()).collect();
    print_json(&project_skill_mastery(skill, &course_ids, &progress))
}

pub fn show_staleness(at: Option<DateTime<Utc>>, state_db: Option<PathBuf>) -> Result<()> {
    let ws = Workspace::open_cwd(state_db, None)?;
    let published = ws.content.all_published_lessons();
    if published.is_empty() {
        println!("No published lessons");
        return Ok(());
    }
    for report in project_staleness_report(&published, now_or(at)) {
        println!(
            "{} version={} stale={} days_since_stale={} recommendation={}",
            report.lesson_id,
            report.version_id,
            report.is_stale,
            report.days_since_stale,
            report.recommendation.as_str()
        );
    }
    Ok(())
}

pub fn show_practice(at: Option<DateTime<Utc>>, state_db: Option<PathBuf>) -> Result<()> {
    let ws = Workspace::open_cwd(state_db, None)?;
    let published = ws.content.all_published_lessons();
    print_json(&project_practice_queue(
        ws.events.list(),
        &published,
        now_or(at),
    ))
}

#[derive(Debug, Clone)]
pub struct CompileCommand {
    pub topic: String,
    pub publish: bool,
    pub fail_at: Option<CompilerPhase>,
    pub delay_ms: Option<u64>,
    pub state_db: Option<PathBuf>,
}

pub fn compile_topic(cmd: CompileCommand) -> Result<()> {
    let mut ws = Workspace::open_cwd(cmd.state_db.clone(), None)?;
    compile_into(&mut ws, cmd)
}

/// Runs the simulated pipeline, records the terminal run, and saves (and
/// optionally publishes) the packaged version.
pub fn compile_into(ws: &mut Workspace, cmd: CompileCommand) -> Result<()> {
    let mut simulated = SimulatedCompiler::new();
    if let Some(phase) = cmd.fail_at {
        simulated = simulated.fail_at(phase);
    }
    if let Some(ms) = cmd.delay_ms {
        simulated = simulated.with_delay(Duration::from_millis(ms));
    }

    let recorded: Arc<Mutex<Vec<CompilerRun>>> = Arc::default();
    let sink = recorded.clone();
    let staged = StagedContentCompiler::new(Arc::new(simulated))
        .with_provenance(
            ws.config.compiler.model.clone(),
            ws.config.compiler.prompt_bundle_version.clone(),
        )
        .on_run_saved(move |run| {
            sink.lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(run.clone())
        });

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("start async runtime")?;
    let outcome = runtime.block_on(staged.run_full(&cmd.topic));

    for snapshot in &outcome.snapshots {
        println!(
            "{} phase={} status={:?}",
            snapshot.id,
            snapshot.phase.map(|p| p.as_str()).unwrap_or("-"),
            snapshot.status
        );
    }
    let runs = std::mem::take(&mut *recorded.lock().unwrap_or_else(|e| e.into_inner()));
    for run in runs {
        ws.content.save_run(run)?;
    }

    if let Some(err) = outcome.error {
        return Err(err.into());
    }
    let version = outcome
        .lesson_version
        .ok_or_else(|| anyhow!("run {} completed without a lesson version", outcome.final_run.id))?
        .with_refresh_policy(ws.config.content.refresh_policy_days);
    let saved = ws.content.save_version(version)?;
    println!(
        "Saved version {} for lesson {} (specHash {})",
        saved.id,
        saved.lesson_id,
        saved.spec_hash.as_deref().unwrap_or("-")
    );
    if cmd.publish {
        ws.content.publish_version(&saved.lesson_id, &saved.id)?;
        println!("Published {} as {}", saved.id, saved.lesson_id);
    }
    Ok(())
}

pub fn list_runs(state_db: Option<PathBuf>) -> Result<()> {
    let ws = Workspace::open_cwd(state_db, None)?;
    let runs = ws.content.list_runs();
    if runs.is_empty() {
        println!("No compiler runs");
        return Ok(());
    }
    for run in runs {
        println!(
            "{} {} status={:?} phase={} topic={}",
            run.id,
            run.timestamp.to_rfc3339(),
            run.status,
            run.phase.map(|p| p.as_str()).unwrap_or("-"),
            run.topic
        );
    }
    Ok(())
}

pub fn show_history(lesson: &str, state_db: Option<PathBuf>) -> Result<()> {
    let ws = Workspace::open_cwd(state_db, None)?;
    let published = ws.content.published_version(lesson).map(|v| v.id.clone());
    let history = ws.content.version_history(lesson);
    if history.is_empty() {
        println!("No versions for lesson {lesson}");
        return Ok(());
    }
    for v in history {
        let marker = if published.as_deref() == Some(v.id.as_str()) {
            " (published)"
        } else {
            ""
        };
        println!(
            "{} created={} hash={}{marker}",
            v.id,
            v.created_at.to_rfc3339(),
            v.spec_hash.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub fn publish(lesson: &str, version: &str, state_db: Option<PathBuf>) -> Result<()> {
    let mut ws = Workspace::open_cwd(state_db, None)?;
    let published = ws.content.publish_version(lesson, version)?;
    println!("Published {} as {}", published.id, published.lesson_id);
    Ok(())
}

pub fn seed_from_file(file: &Path, state_db: Option<PathBuf>) -> Result<()> {
    let mut ws = Workspace::open_cwd(state_db, None)?;
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("read seed file {}", file.display()))?;
    let lessons: Vec<LessonSpec> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", file.display()))?;
    let days = ws.config.content.seed_refresh_policy_days;
    let seeded = ws.content.seed_with_policy(&lessons, Utc::now(), days)?;
    info!(seeded, file = %file.display(), "seed finished");
    println!(
        "Seeded {seeded} of {} lessons ({} already published)",
        lessons.len(),
        lessons.len() - seeded
    );
    Ok(())
}

use crate::app;
use crate::compiler::CompilerPhase;
use crate::pdca::Stage;
use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "learnio", version)]
#[command(
    about = "Event-sourced learning state engine",
    long_about = "learnio records learner attempts as an append-only event log, derives progress, mastery, staleness and practice views by replay, and compiles versioned PDCA lessons through a staged pipeline."
)]
#[command(arg_required_else_help = true)]
#[command(after_long_help = "Examples:
  learnio attempt --user u1 --cu cu-1 --stage act --hints 2
  learnio progress --course rust-101 --lessons l1,l2,l3
  learnio compile \"Rust ownership\" --publish
  learnio staleness
  learnio completion zsh > ~/.zsh/completions/_learnio
  learnio man > learnio.1")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Submit a learner attempt",
        long_about = "Submit a learner attempt. Emits AttemptSubmitted; an act-stage attempt also emits ConfidenceUpdated and CULoopClosed."
    )]
    #[command(arg_required_else_help = true)]
    #[command(after_long_help = "Examples:
  learnio attempt --user u1 --cu cu-1 --stage plan --inputs '{\"prediction\":\"moves\"}'
  learnio attempt --user u1 --cu cu-1 --stage act --hints 1 --correct true")]
    Attempt {
        #[arg(long, value_name = "USER_ID", help = "Learner id")]
        user: String,
        #[arg(long, value_name = "CU_ID", help = "Competency unit id")]
        cu: String,
        #[arg(long, value_name = "STAGE", help = "PDCA stage: plan, do, check or act")]
        stage: Stage,
        #[arg(long, value_name = "SKILL_ID")]
        skill: Option<String>,
        #[arg(long, value_name = "COURSE_ID")]
        course: Option<String>,
        #[arg(long, value_name = "LESSON_ID")]
        lesson: Option<String>,
        #[arg(long, value_name = "BLOCK_ID")]
        block: Option<String>,
        #[arg(long, value_name = "JSON", help = "Attempt inputs as a JSON object")]
        inputs: Option<String>,
        #[arg(long, value_name = "BOOL", help = "Whether the attempt was correct")]
        correct: Option<bool>,
        #[arg(long, default_value_t = 0, value_name = "N", help = "Hints used")]
        hints: u32,
        #[arg(
            long = "misconception",
            value_name = "TAG",
            help = "Misconception tag (repeatable)"
        )]
        misconceptions: Vec<String>,
        #[arg(long, value_name = "PATH", help = "Mirror appended events as NDJSON")]
        log: Option<PathBuf>,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(about = "Record a revealed hint")]
    #[command(arg_required_else_help = true)]
    Hint {
        #[arg(long, value_name = "USER_ID")]
        user: String,
        #[arg(long, value_name = "LESSON_ID")]
        lesson: String,
        #[arg(long, value_name = "BLOCK_ID")]
        block: String,
        #[arg(long, default_value_t = 0, value_name = "N", help = "Hint ladder index")]
        index: u32,
        #[arg(long, value_name = "PATH", help = "Mirror appended events as NDJSON")]
        log: Option<PathBuf>,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(about = "Record a completed lesson")]
    #[command(arg_required_else_help = true)]
    Complete {
        #[arg(long, value_name = "USER_ID")]
        user: String,
        #[arg(long, value_name = "LESSON_ID")]
        lesson: String,
        #[arg(long, value_name = "COURSE_ID")]
        course: Option<String>,
        #[arg(long, value_name = "SKILL_ID")]
        skill: Option<String>,
        #[arg(long, value_name = "PATH", help = "Mirror appended events as NDJSON")]
        log: Option<PathBuf>,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(about = "Print the event log as JSON lines")]
    Events {
        #[arg(long, value_name = "USER_ID", help = "Only events for this learner")]
        user: Option<String>,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(about = "Project course progress from the event log")]
    #[command(arg_required_else_help = true)]
    #[command(after_long_help = "Example:
  learnio progress --course rust-101 --lessons l1,l2,l3")]
    Progress {
        #[arg(long, value_name = "COURSE_ID")]
        course: String,
        #[arg(
            long,
            value_name = "IDS",
            value_delimiter = ',',
            help = "Comma-separated lesson order"
        )]
        lessons: Vec<String>,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(about = "Project skill mastery across courses")]
    #[command(arg_required_else_help = true)]
    #[command(after_long_help = "Example:
  learnio mastery --skill rust --course rust-101=l1,l2 --course rust-201=l3,l4")]
    Mastery {
        #[arg(long, value_name = "SKILL_ID")]
        skill: String,
        #[arg(
            long = "course",
            value_name = "COURSE=LESSONS",
            help = "Course and its lesson order (repeatable)"
        )]
        courses: Vec<String>,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(about = "Report staleness of published lessons")]
    Staleness {
        #[arg(long, value_name = "RFC3339", help = "Evaluate at this instant (default: now)")]
        at: Option<DateTime<Utc>>,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(about = "Build the prioritized practice queue")]
    Practice {
        #[arg(long, value_name = "RFC3339", help = "Evaluate at this instant (default: now)")]
        at: Option<DateTime<Utc>>,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(
        about = "Compile a lesson for a topic",
        long_about = "Run the staged compiler (brief, skeleton, blocks, validate, package) with the built-in simulated generator, record the run, and save the packaged lesson version."
    )]
    #[command(arg_required_else_help = true)]
    #[command(after_long_help = "Examples:
  learnio compile \"Rust ownership\"
  learnio compile \"Rust ownership\" --publish
  learnio compile traits --fail-at skeleton")]
    Compile {
        #[arg(value_name = "TOPIC")]
        topic: String,
        #[arg(long, help = "Publish the saved version")]
        publish: bool,
        #[arg(
            long,
            value_name = "PHASE",
            help = "Make the simulated generator fail in this phase"
        )]
        fail_at: Option<CompilerPhase>,
        #[arg(long, value_name = "MS", help = "Simulated generator delay per phase")]
        delay_ms: Option<u64>,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(about = "List compiler runs, newest first")]
    Runs {
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(about = "List versions of a lesson, newest first")]
    #[command(arg_required_else_help = true)]
    History {
        #[arg(long, value_name = "LESSON_ID")]
        lesson: String,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(about = "Point a lesson at one of its versions")]
    #[command(arg_required_else_help = true)]
    Publish {
        #[arg(long, value_name = "LESSON_ID")]
        lesson: String,
        #[arg(long, value_name = "VERSION_ID")]
        version: String,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(
        about = "Install baseline lessons",
        long_about = "Install baseline lessons from a JSON array of lesson specs. Lessons that already have a published version are skipped."
    )]
    #[command(arg_required_else_help = true)]
    Seed {
        #[arg(value_name = "FILE", help = "JSON file with an array of lesson specs")]
        file: PathBuf,
        #[arg(
            long,
            value_name = "PATH",
            help = "Path to state DB (default: $XDG_STATE_HOME/learnio/state.db)"
        )]
        state_db: Option<PathBuf>,
    },
    #[command(
        about = "Generate shell completion script",
        long_about = "Generate shell completion script for your shell. Redirect output to your shell completion directory."
    )]
    #[command(arg_required_else_help = true)]
    #[command(after_long_help = "Examples:
  learnio completion bash > ~/.local/share/bash-completion/completions/learnio
  learnio completion zsh > ~/.zsh/completions/_learnio
  learnio completion fish > ~/.config/fish/completions/learnio.fish")]
    Completion {
        #[arg(value_enum, value_name = "SHELL", help = "Target shell")]
        shell: Shell,
    },
    #[command(
        about = "Generate a man page",
        long_about = "Generate a roff man page for learnio."
    )]
    #[command(after_long_help = "Examples:
  learnio man > learnio.1
  learnio man --output docs/learnio.1")]
    Man {
        #[arg(
            long,
            value_name = "PATH",
            help = "Write man page to file (stdout when omitted)"
        )]
        output: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Attempt {
            user,
            cu,
            stage,
            skill,
            course,
            lesson,
            block,
            inputs,
            correct,
            hints,
            misconceptions,
            log,
            state_db,
        } => app::record_attempt(app::AttemptCommand {
            user,
            cu,
            stage,
            skill,
            course,
            lesson,
            block,
            inputs,
            correct,
            hints,
            misconceptions,
            state_db,
            log,
        }),
        Commands::Hint {
            user,
            lesson,
            block,
            index,
            log,
            state_db,
        } => app::record_hint(&user, &lesson, &block, index, state_db, log),
        Commands::Complete {
            user,
            lesson,
            course,
            skill,
            log,
            state_db,
        } => app::record_completion(&user, &lesson, course, skill, state_db, log),
        Commands::Events { user, state_db } => app::list_events(user.as_deref(), state_db),
        Commands::Progress {
            course,
            lessons,
            state_db,
        } => app::show_progress(&course, &lessons, state_db),
        Commands::Mastery {
            skill,
            courses,
            state_db,
        } => app::show_mastery(&skill, &courses, state_db),
        Commands::Staleness { at, state_db } => app::show_staleness(at, state_db),
        Commands::Practice { at, state_db } => app::show_practice(at, state_db),
        Commands::Compile {
            topic,
            publish,
            fail_at,
            delay_ms,
            state_db,
        } => app::compile_topic(app::CompileCommand {
            topic,
            publish,
            fail_at,
            delay_ms,
            state_db,
        }),
        Commands::Runs { state_db } => app::list_runs(state_db),
        Commands::History { lesson, state_db } => app::show_history(&lesson, state_db),
        Commands::Publish {
            lesson,
            version,
            state_db,
        } => app::publish(&lesson, &version, state_db),
        Commands::Seed { file, state_db } => app::seed_from_file(&file, state_db),
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Man { output } => {
            let man = clap_mangen::Man::new(Cli::command());
            match output {
                Some(path) => {
                    let mut bytes = Vec::new();
                    man.render(&mut bytes)?;
                    fs::write(path, bytes)?;
                }
                None => {
                    man.render(&mut io::stdout())?;
                }
            }
            Ok(())
        }
    }
}

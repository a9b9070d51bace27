use crate::compiler::{CompilerRun, RunStatus};
use crate::error::{Error, Result};

fn phase_index(run: &CompilerRun) -> Option<usize> {
    run.phase.map(|p| p as usize)
}

/// Guards one step of a run's lifecycle: the run never leaves a terminal
/// status, never moves back a phase, and never loses an artifact.
pub fn validate_transition(prev: &CompilerRun, next: &CompilerRun) -> Result<()> {
    if prev.id != next.id {
        return Err(Error::validation(format!(
            "invalid transition: run id changed from '{}' to '{}'",
            prev.id, next.id
        )));
    }

    if prev.status.is_terminal() {
        if prev == next {
            return Ok(());
        }
        return Err(Error::validation(format!(
            "invalid transition: run '{}' already {:?}",
            prev.id, prev.status
        )));
    }

    if next.status == RunStatus::Pending && prev.phase.is_some() {
        return Err(Error::validation(format!(
            "invalid transition: run '{}' cannot return to pending",
            prev.id
        )));
    }

    if phase_index(next) < phase_index(prev) {
        return Err(Error::validation(format!(
            "invalid transition: run '{}' phase moved backwards",
            prev.id
        )));
    }

    let a = &prev.artifacts;
    let b = &next.artifacts;
    if (a.brief.is_some() && b.brief.is_none())
        || (a.skeleton.is_some() && b.skeleton.is_none())
        || (a.draft_lesson.is_some() && b.draft_lesson.is_none())
        || (a.validation.is_some() && b.validation.is_none())
    {
        return Err(Error::validation(format!(
            "invalid transition: run '{}' dropped an artifact",
            prev.id
        )));
    }

    Ok(())
}

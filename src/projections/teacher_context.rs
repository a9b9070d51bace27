use crate::content::lesson::{Citation, LessonBlock, LessonSpec};
use crate::error::{Error, Result};
use crate::events::{DomainEvent, EventKind};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Everything a tutor needs to respond to a learner on one block.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeacherContext {
    pub block_content: LessonBlock,
    /// Inputs of the most recent attempt on this block.
    pub learner_attempt: Option<BTreeMap<String, Value>>,
    pub rubric: Vec<String>,
    pub hint_ladder: Vec<String>,
    pub hints_revealed: usize,
    pub citations: Vec<Citation>,
}

pub fn build_teacher_context(
    lesson: &LessonSpec,
    block_id: &str,
    events: &[DomainEvent],
) -> Result<TeacherContext> {
    let block = lesson
        .find_block(block_id)
        .ok_or_else(|| Error::not_found("block", format!("{}/{block_id}", lesson.id)))?;

    let mut hints_revealed = 0;
    let mut learner_attempt = None;
    for ev in events {
        match &ev.kind {
            EventKind::HintRevealed(h) if h.lesson_id == lesson.id && h.block_id == block_id => {
                hints_revealed += 1;
            }
            EventKind::AttemptSubmitted(a)
                if a.lesson_id.as_deref() == Some(lesson.id.as_str())
                    && a.block_id.as_deref() == Some(block_id) =>
            {
                learner_attempt = Some(a.inputs.clone());
            }
            _ => {}
        }
    }

    Ok(TeacherContext {
        block_content: block.clone(),
        learner_attempt,
        rubric: block.remediation_targets.clone().unwrap_or_default(),
        hint_ladder: block.hint_ladder().to_vec(),
        hints_revealed,
        citations: lesson.citations.clone().unwrap_or_default(),
    })
}

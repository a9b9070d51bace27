//! Read models derived by replaying the event log.
//!
//! Every projector is pure: no clock reads, no shared state, no I/O. "Now" is
//! always a parameter. Missing data yields empty or zero values, never an
//! error.

pub mod practice;
pub mod progress;
pub mod staleness;
pub mod teacher_context;

pub use practice::{
    PracticeItem, PracticeReason, project_practice_queue, project_practice_queue_with,
};
pub use progress::{
    CourseProgress, MasteryLevel, SkillMastery, project_course_progress, project_skill_mastery,
};
pub use staleness::{Recommendation, StalenessReport, project_staleness_report};
pub use teacher_context::{TeacherContext, build_teacher_context};

/// Rounds half toward positive infinity.
pub(crate) fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

mod common;

use common::*;
use learnio::commands::{Attempt, submit_attempt_command_at};
use learnio::content::{ContentStore, LessonVersion, SourceProvider};
use learnio::events::store::EventLog;
use learnio::pdca::Stage;
use learnio::projections::{
    project_course_progress, project_practice_queue, project_skill_mastery,
    project_staleness_report,
};
use learnio::storage::{KeyValueStore, SqliteKv};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::tempdir;

const ORDER: [&str; 3] = ["l1", "l2", "l3"];

fn act_attempt(hints: u32) -> Attempt {
    Attempt {
        id: "att-1".to_string(),
        user_id: "learner-1".to_string(),
        skill_id: Some("rust".to_string()),
        course_id: Some("rust-101".to_string()),
        lesson_id: Some("l3".to_string()),
        cu_id: "cu-own".to_string(),
        block_id: Some("a1".to_string()),
        stage: Stage::Act,
        inputs: Default::default(),
        result: None,
        hints_used: hints,
        misconception_tags: vec![],
        timestamp: ts("2026-01-02T08:00:00Z"),
    }
}

#[test]
fn hydrated_log_projects_identically() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("state.db");
    let now = ts("2026-06-01T00:00:00Z");

    let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKv::open(&db).unwrap());
    let mut log = EventLog::open(kv.clone()).unwrap();
    log.append(mixed_history()).unwrap();
    log.append(submit_attempt_command_at(
        &act_attempt(2),
        ts("2026-01-02T08:00:00Z"),
    ))
    .unwrap();

    let before_progress = project_course_progress(log.list(), "rust-101", &ORDER);
    let before_queue = project_practice_queue(log.list(), &[], now);
    let before_json = serde_json::to_string(&(&before_progress, &before_queue)).unwrap();
    let before_events = log.list().to_vec();
    drop(log);
    drop(kv);

    let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKv::open(&db).unwrap());
    let log = EventLog::open(kv).unwrap();
    assert_eq!(log.list(), &before_events[..]);

    let after_progress = project_course_progress(log.list(), "rust-101", &ORDER);
    let after_queue = project_practice_queue(log.list(), &[], now);
    let after_json = serde_json::to_string(&(&after_progress, &after_queue)).unwrap();

    assert_eq!(after_progress, before_progress);
    assert_eq!(after_queue, before_queue);
    assert_eq!(after_json, before_json);
}

#[test]
fn rehydrate_replaces_in_memory_state() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKv::open_in_memory().unwrap());
    let mut writer = EventLog::open(kv.clone()).unwrap();
    let mut reader = EventLog::open(kv).unwrap();
    assert!(reader.is_empty());

    writer.append(mixed_history()).unwrap();
    reader.hydrate().unwrap();
    assert_eq!(reader.len(), mixed_history().len());

    writer.reset().unwrap();
    reader.hydrate().unwrap();
    assert!(reader.is_empty());
}

#[test]
fn projectors_are_deterministic() {
    let events = mixed_history();
    let now = ts("2026-06-01T00:00:00Z");
    let mut version = LessonVersion::new(
        "v1",
        lesson("l3"),
        "run-1",
        ts("2025-01-01T00:00:00Z"),
        SourceProvider::ManualSeed,
    );
    version.stale_after = Some(ts("2025-04-01T00:00:00Z"));
    let published = vec![version];

    let first_progress = project_course_progress(&events, "rust-101", &ORDER);
    let map = HashMap::from([("rust-101".to_string(), first_progress.clone())]);
    let first_mastery = project_skill_mastery("rust", &["rust-101", "rust-201"], &map);
    let first_stale = project_staleness_report(&published, now);
    let first_queue = project_practice_queue(&events, &published, now);

    for _ in 0..12 {
        assert_eq!(
            project_course_progress(&events, "rust-101", &ORDER),
            first_progress
        );
        assert_eq!(
            project_skill_mastery("rust", &["rust-101", "rust-201"], &map),
            first_mastery
        );
        assert_eq!(project_staleness_report(&published, now), first_stale);
        assert_eq!(project_practice_queue(&events, &published, now), first_queue);
    }
}

#[test]
fn projected_views_over_a_mixed_history() {
    let events = mixed_history();
    let progress = project_course_progress(&events, "rust-101", &ORDER);
    assert_eq!(progress.percent_complete, 67);
    assert_eq!(progress.current_lesson_id.as_deref(), Some("l3"));
    assert_eq!(progress.next_lesson_id, None);
    assert_eq!(progress.started_at, Some(ts("2026-01-01T09:00:00Z")));
    assert_eq!(progress.last_activity_at, Some(ts("2026-01-01T10:00:00Z")));

    let queue = project_practice_queue(&events, &[], ts("2026-06-01T00:00:00Z"));
    let keys: Vec<(&str, u32)> = queue
        .iter()
        .map(|i| (i.lesson_id.as_str(), i.priority))
        .collect();
    assert_eq!(keys, vec![("cu-own", 10), ("l2", 3)]);
}

#[test]
fn act_attempt_flows_into_the_log_in_order() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKv::open_in_memory().unwrap());
    let mut log = EventLog::open(kv).unwrap();
    let events = submit_attempt_command_at(&act_attempt(0), ts("2026-01-02T08:00:00Z"));
    log.append(events).unwrap();
    assert_eq!(
        kinds(log.list()),
        vec!["AttemptSubmitted", "ConfidenceUpdated", "CULoopClosed"]
    );
}

#[test]
fn content_and_events_share_one_database() {
    let tmp = tempdir().unwrap();
    let kv = Arc::new(SqliteKv::open(&tmp.path().join("shared.db")).unwrap());
    let shared: Arc<dyn KeyValueStore> = kv.clone();

    let mut log = EventLog::open(shared.clone()).unwrap();
    log.append(mixed_history()).unwrap();
    let mut content = ContentStore::open(shared).unwrap();
    content
        .seed(&[lesson("l1")], ts("2026-01-01T00:00:00Z"))
        .unwrap();

    let keys = kv.keys().unwrap();
    assert!(keys.contains(&"learnio_events".to_string()));
    assert!(keys.contains(&"learnio_lesson_versions".to_string()));
    assert!(keys.contains(&"learnio_published_pointers".to_string()));
}

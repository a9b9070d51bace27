use crate::compiler::CompilerRun;
use crate::compiler::transitions::validate_transition;
use crate::content::hash::compute_spec_hash;
use crate::content::lesson::LessonSpec;
use crate::content::version::{LessonVersion, SourceProvider};
use crate::error::{Error, Result};
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const RUNS_KEY: &str = "learnio_compiler_runs";
pub const VERSIONS_KEY: &str = "learnio_lesson_versions";
pub const PUBLISHED_KEY: &str = "learnio_published_pointers";

pub const SEED_RUN_ID: &str = "seed-run";
pub const SEED_REFRESH_POLICY_DAYS: u32 = 365;

/// Immutable lesson versions, the mutable lessonId -> versionId published
/// pointer, and compiler run records.
pub struct ContentStore {
    kv: Arc<dyn KeyValueStore>,
    runs: Vec<CompilerRun>,
    versions: Vec<LessonVersion>,
    published: BTreeMap<String, String>,
}

impl ContentStore {
    pub fn open(kv: Arc<dyn KeyValueStore>) -> Result<Self> {
        let mut store = Self {
            kv,
            runs: Vec::new(),
            versions: Vec::new(),
            published: BTreeMap::new(),
        };
        store.hydrate()?;
        Ok(store)
    }

    pub fn hydrate(&mut self) -> Result<()> {
        self.runs = load(self.kv.as_ref(), RUNS_KEY)?.unwrap_or_default();
        self.versions = load(self.kv.as_ref(), VERSIONS_KEY)?.unwrap_or_default();
        self.published = load(self.kv.as_ref(), PUBLISHED_KEY)?.unwrap_or_default();
        debug!(
            runs = self.runs.len(),
            versions = self.versions.len(),
            published = self.published.len(),
            "hydrated content store"
        );
        Ok(())
    }

    /// Clears every record and the persisted copies. Test isolation only.
    pub fn reset(&mut self) -> Result<()> {
        for key in [RUNS_KEY, VERSIONS_KEY, PUBLISHED_KEY] {
            self.kv.remove(key)?;
        }
        self.runs.clear();
        self.versions.clear();
        self.published.clear();
        Ok(())
    }

    // --- runs ---

    pub fn save_run(&mut self, run: CompilerRun) -> Result<()> {
        let mut runs = self.runs.clone();
        match runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => {
                validate_transition(existing, &run)?;
                *existing = run;
            }
            None => runs.push(run),
        }
        self.kv.set(RUNS_KEY, &serde_json::to_string(&runs)?)?;
        self.runs = runs;
        Ok(())
    }

    pub fn get_run(&self, id: &str) -> Option<&CompilerRun> {
        self.runs.iter().find(|r| r.id == id)
    }

    pub fn require_run(&self, id: &str) -> Result<&CompilerRun> {
        self.get_run(id)
            .ok_or_else(|| Error::not_found("compiler run", id))
    }

    /// Newest first by timestamp.
    pub fn list_runs(&self) -> Vec<&CompilerRun> {
        let mut runs: Vec<&CompilerRun> = self.runs.iter().collect();
        runs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        runs
    }

    // --- versions ---

    /// Stamps `spec_hash` (and the `generated_at`/`stale_after` defaults) and
    /// stores the version.
    ///
    /// Re-saving an existing id is allowed only with an identical hash; a
    /// different hash fails with [`Error::Immutability`] and leaves the
    /// stored record untouched.
    pub fn save_version(&mut self, version: LessonVersion) -> Result<LessonVersion> {
        version.spec.validate()?;
        let incoming_hash = compute_spec_hash(&version.spec)?;

        let mut stamped = version;
        stamped.spec_hash = Some(incoming_hash.clone());
        stamped.generated_at = stamped.generated_at.or(Some(stamped.created_at));
        if stamped.stale_after.is_none() {
            stamped.stale_after = Some(stamped.policy_stale_after());
        }

        let mut versions = self.versions.clone();
        match versions.iter_mut().find(|v| v.id == stamped.id) {
            Some(existing) => {
                if let Some(existing_hash) = existing.spec_hash.as_deref()
                    && existing_hash != incoming_hash
                {
                    return Err(Error::Immutability {
                        version_id: stamped.id.clone(),
                        existing: existing_hash.to_string(),
                        incoming: incoming_hash,
                    });
                }
                *existing = stamped.clone();
            }
            None => versions.push(stamped.clone()),
        }
        self.kv.set(VERSIONS_KEY, &serde_json::to_string(&versions)?)?;
        self.versions = versions;
        debug!(version_id = %stamped.id, lesson_id = %stamped.lesson_id, "saved lesson version");
        Ok(stamped)
    }

    pub fn get_version(&self, id: &str) -> Option<&LessonVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// All versions of `lesson_id`, newest first by `created_at`.
    pub fn version_history(&self, lesson_id: &str) -> Vec<&LessonVersion> {
        let mut history: Vec<&LessonVersion> = self
            .versions
            .iter()
            .filter(|v| v.lesson_id == lesson_id)
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        history
    }

    pub fn publish_version(&mut self, lesson_id: &str, version_id: &str) -> Result<LessonVersion> {
        self.publish_version_at(lesson_id, version_id, Utc::now())
    }

    /// Repoints `lesson_id` at an existing version and stamps `published_at`.
    /// Never creates a version.
    pub fn publish_version_at(
        &mut self,
        lesson_id: &str,
        version_id: &str,
        at: DateTime<Utc>,
    ) -> Result<LessonVersion> {
        let mut version = self
            .get_version(version_id)
            .cloned()
            .ok_or_else(|| Error::not_found("lesson version", version_id))?;
        if version.lesson_id != lesson_id {
            return Err(Error::validation(format!(
                "version '{version_id}' belongs to lesson '{}', not '{lesson_id}'",
                version.lesson_id
            )));
        }

        let mut published = self.published.clone();
        published.insert(lesson_id.to_string(), version_id.to_string());
        let pointers = serde_json::to_string(&published)?;

        let previous_versions = self.versions.clone();
        version.published_at = Some(at);
        let saved = self.save_version(version)?;

        if let Err(err) = self.kv.set(PUBLISHED_KEY, &pointers) {
            // Pointer unchanged: undo the published_at stamp.
            self.versions = previous_versions;
            let rollback = serde_json::to_string(&self.versions)
                .map_err(Error::from)
                .and_then(|raw| self.kv.set(VERSIONS_KEY, &raw));
            if let Err(rollback) = rollback {
                warn!(version_id, error = %rollback, "failed to roll back published_at");
            }
            return Err(err);
        }
        self.published = published;
        info!(lesson_id, version_id, "published lesson version");
        Ok(saved)
    }

    pub fn published_version(&self, lesson_id: &str) -> Option<&LessonVersion> {
        self.published
            .get(lesson_id)
            .and_then(|vid| self.get_version(vid))
    }

    /// Currently published version of every lesson, ordered by lesson id.
    pub fn all_published_lessons(&self) -> Vec<LessonVersion> {
        self.published
            .values()
            .filter_map(|vid| self.get_version(vid).cloned())
            .collect()
    }

    /// Installs baseline content as `manual_seed` with the yearly refresh
    /// policy. Lessons that already have a published version are skipped.
    pub fn seed(&mut self, lessons: &[LessonSpec], now: DateTime<Utc>) -> Result<usize> {
        self.seed_with_policy(lessons, now, SEED_REFRESH_POLICY_DAYS)
    }

    pub fn seed_with_policy(
        &mut self,
        lessons: &[LessonSpec],
        now: DateTime<Utc>,
        refresh_policy_days: u32,
    ) -> Result<usize> {
        let mut seeded = 0;
        for lesson in lessons {
            if self.published.contains_key(&lesson.id) {
                continue;
            }
            let version_id = format!("ver-seed-{}", lesson.id);
            let mut version = LessonVersion::new(
                &version_id,
                lesson.clone(),
                SEED_RUN_ID,
                now,
                SourceProvider::ManualSeed,
            )
            .with_refresh_policy(refresh_policy_days);
            version.stale_after = Some(version.policy_stale_after());
            self.save_version(version)?;
            self.publish_version_at(&lesson.id, &version_id, now)?;
            seeded += 1;
        }
        if seeded > 0 {
            info!(seeded, "seeded lessons");
        }
        Ok(seeded)
    }
}

fn load<T: DeserializeOwned>(kv: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match kv.get(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::validation(format!("persisted `{key}` is malformed: {e}"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{RunProvenance, RunStatus};
    use crate::content::fixtures::sample_lesson;
    use crate::storage::MemoryKv;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn t0() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    fn store() -> (Arc<MemoryKv>, ContentStore) {
        let kv = Arc::new(MemoryKv::new());
        let store = ContentStore::open(kv.clone()).unwrap();
        (kv, store)
    }

    fn version(id: &str, lesson: &str, created_at: DateTime<Utc>) -> LessonVersion {
        LessonVersion::new(
            id,
            sample_lesson(lesson),
            "run-1",
            created_at,
            SourceProvider::MockLlm,
        )
    }

    #[test]
    fn save_stamps_hash_and_defaults() {
        let (_, mut store) = store();
        let saved = store.save_version(version("v1", "lesson-1", t0())).unwrap();
        assert_eq!(saved.spec_hash.as_ref().map(String::len), Some(64));
        assert_eq!(saved.generated_at, Some(t0()));
        assert_eq!(saved.stale_after, Some(t0() + Duration::days(90)));
        assert_eq!(store.get_version("v1"), Some(&saved));
    }

    /// Fails every `set` on `key` while `failing` is on.
    struct FailingKv {
        inner: MemoryKv,
        key: &'static str,
        failing: AtomicBool,
    }

    impl FailingKv {
        fn new(key: &'static str) -> Self {
            Self {
                inner: MemoryKv::new(),
                key,
                failing: AtomicBool::new(false),
            }
        }
    }

    impl KeyValueStore for FailingKv {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if key == self.key && self.failing.load(Ordering::SeqCst) {
                return Err(Error::Storage(rusqlite::Error::InvalidQuery));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn failed_pointer_write_leaves_version_unpublished() {
        let kv = Arc::new(FailingKv::new(PUBLISHED_KEY));
        let mut store = ContentStore::open(kv.clone()).unwrap();
        store.save_version(version("v1", "lesson-1", t0())).unwrap();

        kv.failing.store(true, Ordering::SeqCst);
        let err = store.publish_version_at("lesson-1", "v1", t0()).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(store.get_version("v1").unwrap().published_at, None);
        assert!(store.published_version("lesson-1").is_none());

        let reopened = ContentStore::open(kv.clone()).unwrap();
        assert_eq!(reopened.get_version("v1").unwrap().published_at, None);
        assert!(reopened.published_version("lesson-1").is_none());

        kv.failing.store(false, Ordering::SeqCst);
        store.publish_version_at("lesson-1", "v1", t0()).unwrap();
        assert_eq!(store.published_version("lesson-1").unwrap().id, "v1");
    }

    #[test]
    fn resave_with_identical_spec_is_idempotent() {
        let (_, mut store) = store();
        store.save_version(version("v1", "lesson-1", t0())).unwrap();
        let mut again = version("v1", "lesson-1", t0());
        again.published_at = Some(t0() + Duration::hours(1));
        let saved = store.save_version(again).unwrap();
        assert_eq!(saved.published_at, Some(t0() + Duration::hours(1)));
        assert_eq!(
            store.get_version("v1").unwrap().published_at,
            Some(t0() + Duration::hours(1))
        );
        assert_eq!(store.version_history("lesson-1").len(), 1);
    }

    #[test]
    fn resave_with_changed_spec_is_rejected_and_keeps_original() {
        let (_, mut store) = store();
        let original = store.save_version(version("v1", "lesson-1", t0())).unwrap();

        let mut changed = version("v1", "lesson-1", t0());
        changed.spec.title = "Rewritten".to_string();
        let err = store.save_version(changed).unwrap_err();
        assert!(matches!(err, Error::Immutability { ref version_id, .. } if version_id == "v1"));
        assert_eq!(store.get_version("v1"), Some(&original));
    }

    #[test]
    fn history_is_newest_first_and_scoped_to_lesson() {
        let (_, mut store) = store();
        store.save_version(version("v1", "lesson-1", t0())).unwrap();
        store
            .save_version(version("v2", "lesson-1", t0() + Duration::days(2)))
            .unwrap();
        store
            .save_version(version("v3", "lesson-1", t0() + Duration::days(1)))
            .unwrap();
        store.save_version(version("other", "lesson-2", t0())).unwrap();

        let ids: Vec<&str> = store
            .version_history("lesson-1")
            .iter()
            .map(|v| v.id.as_str())
            .collect();
        assert_eq!(ids, vec!["v2", "v3", "v1"]);
        assert!(store.version_history("unknown").is_empty());
    }

    #[test]
    fn publish_repoints_without_creating_versions() {
        let (_, mut store) = store();
        store.save_version(version("v1", "lesson-1", t0())).unwrap();
        store
            .save_version(version("v2", "lesson-1", t0() + Duration::days(1)))
            .unwrap();

        store.publish_version_at("lesson-1", "v1", t0()).unwrap();
        assert_eq!(store.published_version("lesson-1").unwrap().id, "v1");
        store
            .publish_version_at("lesson-1", "v2", t0() + Duration::days(3))
            .unwrap();
        let published = store.published_version("lesson-1").unwrap();
        assert_eq!(published.id, "v2");
        assert_eq!(published.published_at, Some(t0() + Duration::days(3)));
        assert_eq!(store.version_history("lesson-1").len(), 2);
        assert_eq!(store.all_published_lessons().len(), 1);
    }

    #[test]
    fn publish_rejects_unknown_or_foreign_versions() {
        let (_, mut store) = store();
        store.save_version(version("v1", "lesson-1", t0())).unwrap();

        let missing = store.publish_version("lesson-1", "nope").unwrap_err();
        assert!(matches!(missing, Error::NotFound { .. }));

        let foreign = store.publish_version("lesson-2", "v1").unwrap_err();
        assert!(matches!(foreign, Error::Validation(_)));
        assert!(store.published_version("lesson-2").is_none());
    }

    #[test]
    fn seed_is_idempotent() {
        let (_, mut store) = store();
        let lessons = vec![sample_lesson("lesson-1"), sample_lesson("lesson-2")];
        assert_eq!(store.seed(&lessons, t0()).unwrap(), 2);
        assert_eq!(store.seed(&lessons, t0() + Duration::days(1)).unwrap(), 0);

        let seeded = store.published_version("lesson-1").unwrap();
        assert_eq!(seeded.id, "ver-seed-lesson-1");
        assert_eq!(seeded.source_provider, SourceProvider::ManualSeed);
        assert_eq!(seeded.refresh_policy_days, 365);
        assert_eq!(seeded.compiler_run_id, SEED_RUN_ID);
        assert_eq!(seeded.stale_after, Some(t0() + Duration::days(365)));
    }

    #[test]
    fn state_survives_reopen() {
        let (kv, mut store) = store();
        store.seed(&[sample_lesson("lesson-1")], t0()).unwrap();
        store
            .save_run(CompilerRun {
                id: "run-1".to_string(),
                timestamp: t0(),
                topic: "Ownership".to_string(),
                phase: None,
                status: RunStatus::Pending,
                artifacts: Default::default(),
                provenance: RunProvenance {
                    model: "m".to_string(),
                    prompt_bundle_version: "v1".to_string(),
                },
            })
            .unwrap();

        let reopened = ContentStore::open(kv).unwrap();
        assert_eq!(
            reopened.published_version("lesson-1"),
            store.published_version("lesson-1")
        );
        assert_eq!(reopened.require_run("run-1").unwrap().topic, "Ownership");
        assert!(matches!(
            reopened.require_run("run-2"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn runs_upsert_and_list_newest_first() {
        let (_, mut store) = store();
        let mk = |id: &str, days: i64, status: RunStatus| CompilerRun {
            id: id.to_string(),
            timestamp: t0() + Duration::days(days),
            topic: "t".to_string(),
            phase: None,
            status,
            artifacts: Default::default(),
            provenance: RunProvenance {
                model: "m".to_string(),
                prompt_bundle_version: "v1".to_string(),
            },
        };
        store.save_run(mk("a", 0, RunStatus::Pending)).unwrap();
        store.save_run(mk("b", 1, RunStatus::Pending)).unwrap();
        store.save_run(mk("a", 0, RunStatus::Completed)).unwrap();

        let ids: Vec<&str> = store.list_runs().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(store.get_run("a").unwrap().status, RunStatus::Completed);

        let err = store.save_run(mk("a", 0, RunStatus::Failed)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.get_run("a").unwrap().status, RunStatus::Completed);
    }
}

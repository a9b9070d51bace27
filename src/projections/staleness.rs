use crate::content::version::LessonVersion;
use crate::projections::round_half_up;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    Ok,
    RefreshRecommended,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::Ok => "ok",
            Recommendation::RefreshRecommended => "refresh-recommended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StalenessReport {
    pub lesson_id: String,
    pub version_id: String,
    pub stale_after: Option<DateTime<Utc>>,
    pub is_stale: bool,
    /// Negative while the version is still fresh.
    pub days_since_stale: i64,
    pub recommendation: Recommendation,
}

pub fn project_staleness_report(
    versions: &[LessonVersion],
    now: DateTime<Utc>,
) -> Vec<StalenessReport> {
    versions
        .iter()
        .map(|v| {
            let (is_stale, days_since_stale) = match v.stale_after {
                Some(stale_after) => {
                    let elapsed_ms = (now - stale_after).num_milliseconds() as f64;
                    (now > stale_after, round_half_up(elapsed_ms / MS_PER_DAY))
                }
                None => (false, 0),
            };
            StalenessReport {
                lesson_id: v.lesson_id.clone(),
                version_id: v.id.clone(),
                stale_after: v.stale_after,
                is_stale,
                days_since_stale,
                recommendation: if is_stale {
                    Recommendation::RefreshRecommended
                } else {
                    Recommendation::Ok
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::fixtures::sample_lesson;
    use crate::content::version::SourceProvider;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    fn version(lesson: &str, id: &str, stale_after: Option<DateTime<Utc>>) -> LessonVersion {
        let mut v = LessonVersion::new(
            id,
            sample_lesson(lesson),
            "run-1",
            now(),
            SourceProvider::ManualSeed,
        );
        v.lesson_id = lesson.to_string();
        v.stale_after = stale_after;
        v
    }

    #[test]
    fn past_stale_after_recommends_refresh() {
        let past = "2025-01-01T00:00:00Z".parse().unwrap();
        let [report] = project_staleness_report(&[version("l1", "v1", Some(past))], now())
            .try_into()
            .unwrap();
        assert!(report.is_stale);
        assert_eq!(report.days_since_stale, 365);
        assert_eq!(report.recommendation, Recommendation::RefreshRecommended);
    }

    #[test]
    fn future_stale_after_is_ok_with_negative_days() {
        let future = now() + Duration::days(30);
        let reports = project_staleness_report(&[version("l2", "v2", Some(future))], now());
        assert!(!reports[0].is_stale);
        assert_eq!(reports[0].days_since_stale, -30);
        assert_eq!(reports[0].recommendation, Recommendation::Ok);
    }

    #[test]
    fn exactly_at_stale_after_is_not_stale() {
        let reports = project_staleness_report(&[version("l", "v", Some(now()))], now());
        assert!(!reports[0].is_stale);
        assert_eq!(reports[0].days_since_stale, 0);
    }

    #[test]
    fn missing_stale_after_is_ok() {
        let reports = project_staleness_report(&[version("l3", "v3", None)], now());
        assert!(!reports[0].is_stale);
        assert_eq!(reports[0].recommendation, Recommendation::Ok);
    }

    #[test]
    fn empty_input_empty_report() {
        assert!(project_staleness_report(&[], now()).is_empty());
    }

    #[test]
    fn carries_lesson_and_version_ids() {
        let reports =
            project_staleness_report(&[version("lesson-abc", "version-xyz", None)], now());
        assert_eq!(reports[0].lesson_id, "lesson-abc");
        assert_eq!(reports[0].version_id, "version-xyz");
    }

    #[test]
    fn recommendation_uses_kebab_case() {
        assert_eq!(
            serde_json::to_value(Recommendation::RefreshRecommended).unwrap(),
            "refresh-recommended"
        );
    }
}

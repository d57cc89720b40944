use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::course::{AveragePolicy, CourseConfig};
use crate::model::ids::ChapterId;
use crate::model::record::{ProgressRecord, ProgressStatus};

/// All chapter records for one learner, keyed by chapter id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressStore(BTreeMap<ChapterId, ProgressRecord>);

impl ProgressStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, chapter: &ChapterId) -> Option<&ProgressRecord> {
        self.0.get(chapter)
    }

    /// Stored record, or the default record for a chapter never written.
    #[must_use]
    pub fn chapter_or_default(&self, chapter: &ChapterId) -> ProgressRecord {
        self.0.get(chapter).cloned().unwrap_or_default()
    }

    pub fn insert(&mut self, chapter: ChapterId, record: ProgressRecord) -> Option<ProgressRecord> {
        self.0.insert(chapter, record)
    }

    pub fn remove(&mut self, chapter: &ChapterId) -> Option<ProgressRecord> {
        self.0.remove(chapter)
    }

    #[must_use]
    pub fn contains(&self, chapter: &ChapterId) -> bool {
        self.0.contains_key(chapter)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChapterId, &ProgressRecord)> {
        self.0.iter()
    }

    /// Aggregate progress across the chapters in this store.
    ///
    /// With `AveragePolicy::PresentChapters` the mean is taken over stored
    /// records only, so a single chapter at 50% reports 50 overall.
    #[must_use]
    pub fn overall(&self, config: &CourseConfig) -> OverallProgress {
        let mut completed_chapters = 0_u32;
        let mut in_progress_chapters = 0_u32;
        let mut progress_sum = 0_u64;
        let mut total_time_spent = 0_u64;
        let mut last_activity: Option<DateTime<Utc>> = None;

        for record in self.0.values() {
            match record.status {
                ProgressStatus::Completed => completed_chapters += 1,
                ProgressStatus::InProgress => in_progress_chapters += 1,
                ProgressStatus::NotStarted => {}
            }
            progress_sum += u64::from(record.progress);
            total_time_spent = total_time_spent.saturating_add(record.time_spent);
            last_activity = last_activity.max(record.last_activity());
        }

        let divisor = match config.average_policy() {
            AveragePolicy::PresentChapters => u64::try_from(self.0.len()).unwrap_or(u64::MAX),
            AveragePolicy::AllChapters => u64::from(config.total_chapters()),
        };
        let overall_progress = if divisor == 0 {
            0
        } else {
            u8::try_from(((progress_sum * 2 + divisor) / (2 * divisor)).min(100)).unwrap_or(100)
        };

        OverallProgress {
            overall_progress,
            completed_chapters,
            in_progress_chapters,
            total_chapters: config.total_chapters(),
            total_time_spent,
            last_activity,
        }
    }
}

impl FromIterator<(ChapterId, ProgressRecord)> for ProgressStore {
    fn from_iter<T: IntoIterator<Item = (ChapterId, ProgressRecord)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Course-wide summary derived from a `ProgressStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallProgress {
    pub overall_progress: u8,
    pub completed_chapters: u32,
    pub in_progress_chapters: u32,
    pub total_chapters: u32,
    pub total_time_spent: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn record(status: ProgressStatus, progress: u8, time_spent: u64) -> ProgressRecord {
        ProgressRecord {
            status,
            progress,
            time_spent,
            ..ProgressRecord::default()
        }
    }

    #[test]
    fn overall_averages_over_present_chapters() {
        let store: ProgressStore = [(
            ChapterId::new("chapter-1"),
            record(ProgressStatus::InProgress, 50, 0),
        )]
        .into_iter()
        .collect();

        let overall = store.overall(&CourseConfig::default());
        assert_eq!(overall.overall_progress, 50);
        assert_eq!(overall.total_chapters, 7);
        assert_eq!(overall.in_progress_chapters, 1);
        assert_eq!(overall.completed_chapters, 0);
    }

    #[test]
    fn overall_can_average_over_whole_course() {
        let store: ProgressStore = [(
            ChapterId::new("chapter-1"),
            record(ProgressStatus::InProgress, 50, 0),
        )]
        .into_iter()
        .collect();

        let config = CourseConfig::default().with_average_policy(AveragePolicy::AllChapters);
        assert_eq!(store.overall(&config).overall_progress, 7);
    }

    #[test]
    fn overall_sums_time_and_tracks_latest_activity() {
        let now = fixed_now();
        let mut first = record(ProgressStatus::Completed, 100, 600);
        first.last_updated = Some(now);
        let mut second = record(ProgressStatus::InProgress, 20, 90);
        second.last_visited = Some(now + Duration::hours(1));

        let store: ProgressStore = [
            (ChapterId::new("chapter-1"), first),
            (ChapterId::new("chapter-2"), second),
        ]
        .into_iter()
        .collect();

        let overall = store.overall(&CourseConfig::default());
        assert_eq!(overall.overall_progress, 60);
        assert_eq!(overall.completed_chapters, 1);
        assert_eq!(overall.in_progress_chapters, 1);
        assert_eq!(overall.total_time_spent, 690);
        assert_eq!(overall.last_activity, Some(now + Duration::hours(1)));
    }

    #[test]
    fn empty_store_reports_zero() {
        let overall = ProgressStore::new().overall(&CourseConfig::default());
        assert_eq!(overall.overall_progress, 0);
        assert_eq!(overall.last_activity, None);
    }

    #[test]
    fn store_serializes_as_chapter_map() {
        let store: ProgressStore = [(
            ChapterId::new("chapter-2"),
            record(ProgressStatus::Completed, 100, 0),
        )]
        .into_iter()
        .collect();
        let json = serde_json::to_value(&store).unwrap();
        assert_eq!(json["chapter-2"]["status"], "completed");
        assert_eq!(json["chapter-2"]["progress"], 100);
    }
}

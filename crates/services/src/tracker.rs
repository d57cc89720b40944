use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lab_core::model::{
    ChapterId, ProgressExport, ProgressPatch, ProgressRecord, ProgressStore, SectionId, UserId,
};

use crate::progress_service::ProgressService;

/// Aggregate statistics shown next to the chapter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressStats {
    pub completed_chapters: u32,
    pub in_progress_chapters: u32,
    pub not_started_chapters: u32,
    pub total_chapters: u32,
    pub overall_progress: u8,
    pub total_time_spent: u64,
}

#[derive(Default)]
struct TrackerState {
    store: ProgressStore,
    loaded: bool,
    revision: u64,
    stats: Option<(u64, ProgressStats)>,
}

/// Local, observable copy of one learner's progress.
///
/// Every action goes through `ProgressService` and then replaces the local
/// snapshot with the store it returned, bumping `revision`. Statistics are
/// recomputed only when the revision moves.
pub struct ProgressTracker {
    service: Arc<ProgressService>,
    user: UserId,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(service: Arc<ProgressService>, user: UserId) -> Self {
        Self {
            service,
            user,
            state: Mutex::new(TrackerState::default()),
        }
    }

    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self, store: ProgressStore) -> ProgressStore {
        let mut state = self.state();
        state.store = store.clone();
        state.loaded = true;
        state.revision += 1;
        store
    }

    /// Pull the stored progress into the local snapshot.
    pub async fn load(&self) -> ProgressStore {
        let store = self.service.get_all(&self.user).await;
        self.replace(store)
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state().loaded
    }

    /// Number of snapshot replacements so far.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.state().revision
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressStore {
        self.state().store.clone()
    }

    #[must_use]
    pub fn chapter_record(&self, chapter: &ChapterId) -> ProgressRecord {
        self.state().store.chapter_or_default(chapter)
    }

    pub async fn update_chapter(&self, chapter: &ChapterId, patch: ProgressPatch) -> ProgressStore {
        let store = self.service.update_chapter(&self.user, chapter, patch).await;
        self.replace(store)
    }

    pub async fn complete_section(&self, chapter: &ChapterId, section: &SectionId) -> ProgressStore {
        let store = self
            .service
            .complete_section(&self.user, chapter, section)
            .await;
        self.replace(store)
    }

    pub async fn start_chapter(&self, chapter: &ChapterId) -> ProgressStore {
        let store = self.service.start_chapter(&self.user, chapter).await;
        self.replace(store)
    }

    pub async fn complete_chapter(&self, chapter: &ChapterId) -> ProgressStore {
        let store = self.service.complete_chapter(&self.user, chapter).await;
        self.replace(store)
    }

    pub async fn record_time_spent(&self, chapter: &ChapterId, seconds: u64) -> ProgressStore {
        let store = self
            .service
            .record_time_spent(&self.user, chapter, seconds)
            .await;
        self.replace(store)
    }

    pub async fn record_score(&self, chapter: &ChapterId, score: i64) -> ProgressStore {
        let store = self.service.record_score(&self.user, chapter, score).await;
        self.replace(store)
    }

    pub async fn reset_chapter(&self, chapter: &ChapterId) -> ProgressStore {
        let store = self.service.reset_chapter(&self.user, chapter).await;
        self.replace(store)
    }

    /// Clear everything, then reload so a failed clear still shows what is stored.
    pub async fn reset_all(&self) -> ProgressStore {
        self.service.reset_all(&self.user).await;
        self.load().await
    }

    pub async fn export_all(&self) -> ProgressExport {
        self.service.export_all(&self.user).await
    }

    /// Import an export document; on success the snapshot is reloaded.
    pub async fn import_all(&self, payload: &serde_json::Value) -> bool {
        let imported = self.service.import_all(&self.user, payload).await;
        if imported {
            self.load().await;
        }
        imported
    }

    /// Statistics for the current snapshot, cached per revision.
    #[must_use]
    pub fn stats(&self) -> ProgressStats {
        let mut state = self.state();
        if let Some((revision, stats)) = state.stats {
            if revision == state.revision {
                return stats;
            }
        }

        let overall = state.store.overall(self.service.config());
        let started = overall.completed_chapters + overall.in_progress_chapters;
        let stats = ProgressStats {
            completed_chapters: overall.completed_chapters,
            in_progress_chapters: overall.in_progress_chapters,
            not_started_chapters: overall.total_chapters.saturating_sub(started),
            total_chapters: overall.total_chapters,
            overall_progress: overall.overall_progress,
            total_time_spent: overall.total_time_spent,
        };
        state.stats = Some((state.revision, stats));
        stats
    }

    /// View narrowed to a single chapter.
    #[must_use]
    pub fn chapter(&self, chapter: ChapterId) -> ChapterProgress<'_> {
        ChapterProgress {
            tracker: self,
            chapter,
        }
    }
}

/// One chapter's slice of a `ProgressTracker`, with chapter-scoped actions.
pub struct ChapterProgress<'a> {
    tracker: &'a ProgressTracker,
    chapter: ChapterId,
}

impl ChapterProgress<'_> {
    #[must_use]
    pub fn chapter_id(&self) -> &ChapterId {
        &self.chapter
    }

    #[must_use]
    pub fn record(&self) -> ProgressRecord {
        self.tracker.chapter_record(&self.chapter)
    }

    #[must_use]
    pub fn is_section_completed(&self, section: &SectionId) -> bool {
        self.record().is_section_completed(section)
    }

    pub async fn complete_section(&self, section: &SectionId) -> ProgressRecord {
        let store = self.tracker.complete_section(&self.chapter, section).await;
        store.chapter_or_default(&self.chapter)
    }

    pub async fn update(&self, patch: ProgressPatch) -> ProgressRecord {
        let store = self.tracker.update_chapter(&self.chapter, patch).await;
        store.chapter_or_default(&self.chapter)
    }

    pub async fn start(&self) -> ProgressRecord {
        let store = self.tracker.start_chapter(&self.chapter).await;
        store.chapter_or_default(&self.chapter)
    }

    pub async fn complete(&self) -> ProgressRecord {
        let store = self.tracker.complete_chapter(&self.chapter).await;
        store.chapter_or_default(&self.chapter)
    }

    pub async fn record_time_spent(&self, seconds: u64) -> ProgressRecord {
        let store = self.tracker.record_time_spent(&self.chapter, seconds).await;
        store.chapter_or_default(&self.chapter)
    }

    pub async fn reset(&self) -> ProgressRecord {
        let store = self.tracker.reset_chapter(&self.chapter).await;
        store.chapter_or_default(&self.chapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use lab_core::model::{CourseConfig, ProgressStatus, SyncMeta};
    use lab_core::time::fixed_clock;
    use storage::repository::{InMemoryRepository, ProgressRepository, StorageError};

    /// In-memory storage that cannot be cleared.
    struct ClearFails(InMemoryRepository);

    #[async_trait]
    impl ProgressRepository for ClearFails {
        async fn load_progress(&self) -> Result<Option<ProgressStore>, StorageError> {
            self.0.load_progress().await
        }

        async fn save_progress(&self, store: &ProgressStore) -> Result<(), StorageError> {
            self.0.save_progress(store).await
        }

        async fn load_sync_meta(&self) -> Result<Option<SyncMeta>, StorageError> {
            self.0.load_sync_meta().await
        }

        async fn save_sync_meta(&self, meta: &SyncMeta) -> Result<(), StorageError> {
            self.0.save_sync_meta(meta).await
        }

        async fn clear(&self) -> Result<(), StorageError> {
            Err(StorageError::Connection("locked".into()))
        }
    }

    fn tracker_over(repo: Arc<dyn ProgressRepository>) -> ProgressTracker {
        let service = ProgressService::new(fixed_clock(), CourseConfig::default(), repo);
        ProgressTracker::new(Arc::new(service), UserId::anonymous())
    }

    fn tracker() -> ProgressTracker {
        tracker_over(Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn load_marks_tracker_ready() {
        let tracker = tracker();
        assert!(!tracker.is_loaded());
        tracker.load().await;
        assert!(tracker.is_loaded());
        assert!(tracker.snapshot().is_empty());
    }

    #[tokio::test]
    async fn actions_refresh_snapshot() {
        let tracker = tracker();
        tracker.load().await;
        tracker
            .complete_section(&ChapterId::new("chapter-1"), &SectionId::new("1-0"))
            .await;

        let record = tracker.chapter_record(&ChapterId::new("chapter-1"));
        assert_eq!(record.status, ProgressStatus::InProgress);
        assert_eq!(record.progress, 8);
    }

    #[tokio::test]
    async fn stats_count_unvisited_chapters_as_not_started() {
        let tracker = tracker();
        tracker.complete_chapter(&ChapterId::new("chapter-1")).await;
        tracker.start_chapter(&ChapterId::new("chapter-2")).await;

        let stats = tracker.stats();
        assert_eq!(stats.completed_chapters, 1);
        assert_eq!(stats.in_progress_chapters, 1);
        assert_eq!(stats.not_started_chapters, 5);
        assert_eq!(stats.total_chapters, 7);
        assert_eq!(stats.overall_progress, 50);
    }

    #[tokio::test]
    async fn stats_are_cached_until_revision_changes() {
        let tracker = tracker();
        tracker.load().await;
        let first = tracker.stats();
        let revision = tracker.revision();
        assert_eq!(tracker.stats(), first);
        assert_eq!(tracker.revision(), revision);

        tracker.complete_chapter(&ChapterId::new("chapter-3")).await;
        assert_ne!(tracker.revision(), revision);
        assert_eq!(tracker.stats().completed_chapters, 1);
    }

    #[tokio::test]
    async fn chapter_view_scopes_actions() {
        let tracker = tracker();
        let chapter = tracker.chapter(ChapterId::new("chapter-4"));
        let section = SectionId::new("4-2");

        assert!(!chapter.is_section_completed(&section));
        let record = chapter.complete_section(&section).await;
        assert!(record.is_section_completed(&section));
        assert!(chapter.is_section_completed(&section));

        let record = chapter.record_time_spent(30).await;
        assert_eq!(record.time_spent, 30);

        let record = chapter.reset().await;
        assert_eq!(record, ProgressRecord::default());
        assert!(tracker.snapshot().is_empty());
    }

    #[tokio::test]
    async fn reset_all_empties_snapshot() {
        let tracker = tracker();
        tracker.start_chapter(&ChapterId::new("chapter-1")).await;
        tracker.reset_all().await;
        assert!(tracker.snapshot().is_empty());
        assert_eq!(tracker.stats().not_started_chapters, 7);
    }

    #[tokio::test]
    async fn failed_reset_all_keeps_stored_snapshot() {
        let tracker = tracker_over(Arc::new(ClearFails(InMemoryRepository::new())));
        tracker.start_chapter(&ChapterId::new("chapter-1")).await;

        let store = tracker.reset_all().await;
        assert_eq!(store.len(), 1);
        assert!(tracker.snapshot().contains(&ChapterId::new("chapter-1")));
        assert_eq!(tracker.stats().in_progress_chapters, 1);
    }
}

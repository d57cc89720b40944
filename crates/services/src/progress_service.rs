use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use lab_core::model::{
    ChapterId, CourseConfig, OverallProgress, ProgressExport, ProgressPatch, ProgressRecord,
    ProgressStatus, ProgressStore, SectionId, SyncMeta, UserId,
};
use lab_core::time::Clock;
use storage::remote::RemoteProgressStore;
use storage::repository::{ProgressRepository, StorageError};

use crate::error::ProgressServiceError;

//
// ─── SYNC OUTCOME ──────────────────────────────────────────────────────────────
//

/// Result of asking the service to mirror local progress remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No remote store is configured; local state stays pending.
    NoRemote,
    /// Nothing changed locally since the last push.
    UpToDate,
    /// The store was pushed and the pending flag cleared.
    Pushed,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Single source of truth for a learner's course progress.
///
/// Public operations never fail: storage problems are logged and turned into
/// empty or default values.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    config: Arc<CourseConfig>,
    repo: Arc<dyn ProgressRepository>,
    remote: Option<Arc<dyn RemoteProgressStore>>,
}

impl ProgressService {
    #[must_use]
    pub fn new(clock: Clock, config: CourseConfig, repo: Arc<dyn ProgressRepository>) -> Self {
        Self {
            clock,
            config: Arc::new(config),
            repo,
            remote: None,
        }
    }

    /// Attach a remote store used by `sync`.
    #[must_use]
    pub fn with_remote(mut self, remote: Arc<dyn RemoteProgressStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    #[must_use]
    pub fn config(&self) -> &CourseConfig {
        &self.config
    }

    /// Full progress map, empty when nothing is stored or storage fails.
    pub async fn get_all(&self, user: &UserId) -> ProgressStore {
        match self.repo.load_progress().await {
            Ok(store) => store.unwrap_or_default(),
            Err(err) => {
                error!("failed to load progress for {user}: {err}");
                ProgressStore::new()
            }
        }
    }

    /// Record for one chapter, or the default not-started record.
    pub async fn get_chapter(&self, user: &UserId, chapter: &ChapterId) -> ProgressRecord {
        self.get_all(user).await.chapter_or_default(chapter)
    }

    /// Merge `patch` into a chapter's record and persist the whole store.
    ///
    /// Returns the updated store, or an empty one if persisting failed.
    pub async fn update_chapter(
        &self,
        user: &UserId,
        chapter: &ChapterId,
        patch: ProgressPatch,
    ) -> ProgressStore {
        self.degrade(user, "update chapter", self.try_patch(user, chapter, |_| patch))
            .await
    }

    /// Mark a section complete. Repeating the call leaves the section set unchanged.
    pub async fn complete_section(
        &self,
        user: &UserId,
        chapter: &ChapterId,
        section: &SectionId,
    ) -> ProgressStore {
        let work = self.try_patch(user, chapter, |record| {
            let mut sections = record.completed_sections.clone();
            sections.insert(section.clone());
            ProgressPatch::new()
                .completed_sections(sections)
                .status(record.status.started())
        });
        self.degrade(user, "complete section", work).await
    }

    /// Explicitly open a chapter: stamps `last_visited` and leaves `not_started`.
    pub async fn start_chapter(&self, user: &UserId, chapter: &ChapterId) -> ProgressStore {
        let now = self.clock.now();
        let work = self.try_patch(user, chapter, |record| {
            ProgressPatch::new()
                .last_visited(now)
                .status(record.status.started())
        });
        self.degrade(user, "start chapter", work).await
    }

    /// Explicitly finish a chapter.
    pub async fn complete_chapter(&self, user: &UserId, chapter: &ChapterId) -> ProgressStore {
        let work = self.try_patch(user, chapter, |_| {
            ProgressPatch::new()
                .status(ProgressStatus::Completed)
                .progress(100)
        });
        self.degrade(user, "complete chapter", work).await
    }

    /// Add `seconds` of study time to a chapter.
    pub async fn record_time_spent(
        &self,
        user: &UserId,
        chapter: &ChapterId,
        seconds: u64,
    ) -> ProgressStore {
        let work = self.try_patch(user, chapter, |record| {
            ProgressPatch::new().time_spent(record.time_spent.saturating_add(seconds))
        });
        self.degrade(user, "record time", work).await
    }

    /// Store a quiz score for a chapter.
    pub async fn record_score(&self, user: &UserId, chapter: &ChapterId, score: i64) -> ProgressStore {
        let work = self.try_patch(user, chapter, |_| ProgressPatch::new().score(score));
        self.degrade(user, "record score", work).await
    }

    /// Drop one chapter's record; every other record is left as stored.
    pub async fn reset_chapter(&self, user: &UserId, chapter: &ChapterId) -> ProgressStore {
        let work = async {
            let mut store = self.load_for_write().await?;
            if store.remove(chapter).is_some() {
                self.persist(&store).await?;
                debug!("reset {chapter} for {user}");
            }
            Ok::<_, ProgressServiceError>(store)
        };
        self.degrade(user, "reset chapter", work).await
    }

    /// Clear the store and its sync bookkeeping.
    pub async fn reset_all(&self, user: &UserId) {
        match self.repo.clear().await {
            Ok(()) => info!("cleared all progress for {user}"),
            Err(err) => error!("failed to clear progress for {user}: {err}"),
        }
    }

    /// Snapshot suitable for writing to an export file.
    pub async fn export_all(&self, user: &UserId) -> ProgressExport {
        ProgressExport::new(user.clone(), self.get_all(user).await, self.clock.now())
    }

    /// Replace the store with the `progress` of an export document.
    ///
    /// Returns `false`, leaving storage untouched, when the payload has no
    /// usable `progress` field, a record claims more than 100 percent, or the
    /// store cannot be written.
    pub async fn import_all(&self, user: &UserId, payload: &serde_json::Value) -> bool {
        match self.try_import(payload).await {
            Ok(chapters) => {
                info!("imported {chapters} chapter records for {user}");
                true
            }
            Err(err) => {
                warn!("rejected progress import for {user}: {err}");
                false
            }
        }
    }

    /// Course-wide aggregate of the stored chapters.
    pub async fn overall_progress(&self, user: &UserId) -> OverallProgress {
        self.get_all(user).await.overall(&self.config)
    }

    /// Whether local changes have not reached the remote store yet.
    pub async fn has_pending_sync(&self) -> bool {
        match self.repo.load_sync_meta().await {
            Ok(meta) => meta.is_some_and(|meta| meta.pending_sync),
            Err(err) => {
                error!("failed to read sync metadata: {err}");
                false
            }
        }
    }

    /// Push the local store to the remote store if one is attached and changes are pending.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError` if storage cannot be read or the remote
    /// rejects the push; the pending flag is kept in that case.
    pub async fn sync(&self, user: &UserId) -> Result<SyncOutcome, ProgressServiceError> {
        let Some(remote) = self.remote.as_ref() else {
            return Ok(SyncOutcome::NoRemote);
        };
        let meta = self.repo.load_sync_meta().await?.unwrap_or_default();
        if !meta.pending_sync {
            return Ok(SyncOutcome::UpToDate);
        }

        let store = self.repo.load_progress().await?.unwrap_or_default();
        remote.push(user, &store).await?;
        self.repo
            .save_sync_meta(&meta.synced(self.clock.now()))
            .await?;
        info!("pushed {} chapter records for {user}", store.len());
        Ok(SyncOutcome::Pushed)
    }

    // ─── internals ────────────────────────────────────────────────────────────

    async fn degrade<F>(&self, user: &UserId, action: &str, work: F) -> ProgressStore
    where
        F: Future<Output = Result<ProgressStore, ProgressServiceError>>,
    {
        match work.await {
            Ok(store) => store,
            Err(err) => {
                error!("failed to {action} for {user}: {err}");
                ProgressStore::new()
            }
        }
    }

    /// Read-modify-write of one chapter record.
    async fn try_patch(
        &self,
        user: &UserId,
        chapter: &ChapterId,
        build: impl FnOnce(&ProgressRecord) -> ProgressPatch,
    ) -> Result<ProgressStore, ProgressServiceError> {
        let mut store = self.load_for_write().await?;
        let current = store.chapter_or_default(chapter);
        let patch = build(&current);
        let now = self.clock.now();
        let record = current.apply_patch(patch, now, self.config.sections_for(chapter));
        debug!(
            "{user} {chapter}: {} at {}%",
            record.status.as_str(),
            record.progress
        );
        store.insert(chapter.clone(), record);
        self.persist(&store).await?;
        Ok(store)
    }

    /// Load the store for a mutation. An unreadable document is replaced
    /// instead of blocking every later write.
    async fn load_for_write(&self) -> Result<ProgressStore, ProgressServiceError> {
        match self.repo.load_progress().await {
            Ok(store) => Ok(store.unwrap_or_default()),
            Err(StorageError::Serialization(reason)) => {
                warn!("discarding unreadable progress document: {reason}");
                Ok(ProgressStore::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Save the store, then flag it for sync. Once the document is written a
    /// failed metadata write only costs the pending flag.
    async fn persist(&self, store: &ProgressStore) -> Result<(), ProgressServiceError> {
        let now = self.clock.now();
        self.repo.save_progress(store).await?;
        if let Err(err) = self.mark_pending(now).await {
            warn!("progress saved but sync metadata was not updated: {err}");
        }
        Ok(())
    }

    async fn mark_pending(&self, now: DateTime<Utc>) -> Result<(), StorageError> {
        let meta = match self.repo.load_sync_meta().await {
            Ok(meta) => meta.unwrap_or_default(),
            Err(StorageError::Serialization(reason)) => {
                warn!("discarding unreadable sync metadata: {reason}");
                SyncMeta::default()
            }
            Err(err) => return Err(err),
        };
        self.repo.save_sync_meta(&meta.touched(now)).await
    }

    async fn try_import(&self, payload: &serde_json::Value) -> Result<usize, ProgressServiceError> {
        let store = ProgressExport::progress_from_value(payload)?;
        self.repo.save_progress(&store).await?;
        if let Err(err) = self
            .repo
            .save_sync_meta(&SyncMeta::default().touched(self.clock.now()))
            .await
        {
            warn!("imported progress saved but sync metadata was not updated: {err}");
        }
        Ok(store.len())
    }
}

use std::sync::Arc;

use lab_core::model::{CourseConfig, UserId};
use storage::remote::RemoteProgressStore;
use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::tracker::ProgressTracker;

/// Assembles app-facing services. Built once at start-up and handed to
/// whatever drives the UI.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        config: CourseConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, config))
    }

    /// Build services over an already assembled `Storage`.
    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, config: CourseConfig) -> Self {
        let progress = ProgressService::new(clock, config, Arc::clone(&storage.progress));
        Self {
            progress: Arc::new(progress),
        }
    }

    /// Attach a remote store to the progress service.
    #[must_use]
    pub fn with_remote(self, remote: Arc<dyn RemoteProgressStore>) -> Self {
        let progress = self.progress.as_ref().clone().with_remote(remote);
        Self {
            progress: Arc::new(progress),
        }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    /// A fresh tracker bound to `user`; call `load` before reading it.
    #[must_use]
    pub fn tracker(&self, user: UserId) -> ProgressTracker {
        ProgressTracker::new(self.progress(), user)
    }
}

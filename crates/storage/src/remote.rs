//! Seam for mirroring local progress to a remote store.
//!
//! No network backend ships yet; `InMemoryRemote` stands in for tests.

use async_trait::async_trait;
use lab_core::model::{ProgressStore, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteSyncError {
    #[error("remote store rejected the update: {0}")]
    Rejected(String),

    #[error("remote store unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait RemoteProgressStore: Send + Sync {
    /// Replace the remote copy of a learner's progress.
    ///
    /// # Errors
    ///
    /// Returns `RemoteSyncError` if the remote cannot accept the update.
    async fn push(&self, user: &UserId, store: &ProgressStore) -> Result<(), RemoteSyncError>;

    /// Fetch the remote copy, `Ok(None)` if the learner has none.
    ///
    /// # Errors
    ///
    /// Returns `RemoteSyncError` if the remote cannot be reached.
    async fn fetch(&self, user: &UserId) -> Result<Option<ProgressStore>, RemoteSyncError>;
}

#[derive(Clone, Default)]
pub struct InMemoryRemote {
    stores: Arc<Mutex<HashMap<UserId, ProgressStore>>>,
    offline: Arc<Mutex<bool>>,
}

impl InMemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated connectivity loss.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut guard) = self.offline.lock() {
            *guard = offline;
        }
    }

    fn ensure_online(&self) -> Result<(), RemoteSyncError> {
        let offline = self
            .offline
            .lock()
            .map_err(|e| RemoteSyncError::Unreachable(e.to_string()))?;
        if *offline {
            return Err(RemoteSyncError::Unreachable("offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteProgressStore for InMemoryRemote {
    async fn push(&self, user: &UserId, store: &ProgressStore) -> Result<(), RemoteSyncError> {
        self.ensure_online()?;
        let mut guard = self
            .stores
            .lock()
            .map_err(|e| RemoteSyncError::Rejected(e.to_string()))?;
        guard.insert(user.clone(), store.clone());
        Ok(())
    }

    async fn fetch(&self, user: &UserId) -> Result<Option<ProgressStore>, RemoteSyncError> {
        self.ensure_online()?;
        let guard = self
            .stores
            .lock()
            .map_err(|e| RemoteSyncError::Unreachable(e.to_string()))?;
        Ok(guard.get(user).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_core::model::{ChapterId, ProgressRecord};

    #[tokio::test]
    async fn push_then_fetch_per_user() {
        let remote = InMemoryRemote::new();
        let mut store = ProgressStore::new();
        store.insert(ChapterId::new("chapter-1"), ProgressRecord::default());

        remote.push(&UserId::new("ada"), &store).await.unwrap();
        assert_eq!(remote.fetch(&UserId::new("ada")).await.unwrap(), Some(store));
        assert_eq!(remote.fetch(&UserId::new("bob")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn offline_remote_is_unreachable() {
        let remote = InMemoryRemote::new();
        remote.set_offline(true);
        let err = remote
            .push(&UserId::anonymous(), &ProgressStore::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteSyncError::Unreachable(_)));
    }
}

use async_trait::async_trait;
use lab_core::model::{ProgressStore, SyncMeta};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Key of the document holding the chapter → record map.
pub const PROGRESS_KEY: &str = "problab_progress";

/// Key of the document holding sync bookkeeping.
pub const SYNC_META_KEY: &str = "problab_progress_meta";

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("storage unavailable")]
    Unavailable,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub(crate) fn encode_document<T: Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub(crate) fn decode_document<T: DeserializeOwned>(
    key: &str,
    body: &str,
) -> Result<T, StorageError> {
    serde_json::from_str(body).map_err(|e| {
        log::warn!("stored {key} document is not valid JSON for its type: {e}");
        StorageError::Serialization(format!("{key}: {e}"))
    })
}

/// Repository contract for the two progress documents.
///
/// Every write replaces the whole document; concurrent writers race and the
/// last one wins.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the stored progress map.
    ///
    /// Returns `Ok(None)` when nothing has been written yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored document is malformed,
    /// or other storage errors.
    async fn load_progress(&self) -> Result<Option<ProgressStore>, StorageError>;

    /// Replace the stored progress map.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be stored.
    async fn save_progress(&self, store: &ProgressStore) -> Result<(), StorageError>;

    /// Fetch sync bookkeeping, `Ok(None)` if never written.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be read or decoded.
    async fn load_sync_meta(&self) -> Result<Option<SyncMeta>, StorageError>;

    /// Replace sync bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be stored.
    async fn save_sync_meta(&self, meta: &SyncMeta) -> Result<(), StorageError>;

    /// Remove both documents.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if removal fails.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Documents are kept as JSON text, the same shape the `SQLite` backend persists.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    documents: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            documents: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Overwrite a document body verbatim, bypassing encoding.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn put_raw(&self, key: &str, body: impl Into<String>) -> Result<(), StorageError> {
        let mut guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), body.into());
        Ok(())
    }

    /// Read a document body verbatim.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        self.get_raw(key)?
            .map(|body| decode_document(key, &body))
            .transpose()
    }

    fn store<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        self.put_raw(key, encode_document(value)?)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load_progress(&self) -> Result<Option<ProgressStore>, StorageError> {
        self.load(PROGRESS_KEY)
    }

    async fn save_progress(&self, store: &ProgressStore) -> Result<(), StorageError> {
        self.store(PROGRESS_KEY, store)
    }

    async fn load_sync_meta(&self) -> Result<Option<SyncMeta>, StorageError> {
        self.load(SYNC_META_KEY)
    }

    async fn save_sync_meta(&self, meta: &SyncMeta) -> Result<(), StorageError> {
        self.store(SYNC_META_KEY, meta)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self
            .documents
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(PROGRESS_KEY);
        guard.remove(SYNC_META_KEY);
        Ok(())
    }
}

/// Backend for contexts without durable storage; every call fails with
/// `StorageError::Unavailable`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableRepository;

#[async_trait]
impl ProgressRepository for UnavailableRepository {
    async fn load_progress(&self) -> Result<Option<ProgressStore>, StorageError> {
        Err(StorageError::Unavailable)
    }

    async fn save_progress(&self, _store: &ProgressStore) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    async fn load_sync_meta(&self) -> Result<Option<SyncMeta>, StorageError> {
        Err(StorageError::Unavailable)
    }

    async fn save_sync_meta(&self, _meta: &SyncMeta) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    async fn clear(&self) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(InMemoryRepository::new());
        Self { progress }
    }

    #[must_use]
    pub fn unavailable() -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(UnavailableRepository);
        Self { progress }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_core::model::{ChapterId, ProgressRecord, ProgressStatus, SectionId};
    use lab_core::time::fixed_now;

    fn sample_store() -> ProgressStore {
        let mut record = ProgressRecord {
            status: ProgressStatus::InProgress,
            progress: 8,
            last_updated: Some(fixed_now()),
            ..ProgressRecord::default()
        };
        record.completed_sections.insert(SectionId::new("1-0"));
        [(ChapterId::new("chapter-1"), record)].into_iter().collect()
    }

    #[tokio::test]
    async fn empty_repository_has_no_documents() {
        let repo = InMemoryRepository::new();
        assert!(repo.load_progress().await.unwrap().is_none());
        assert!(repo.load_sync_meta().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persists_progress_as_json_text() {
        let repo = InMemoryRepository::new();
        let store = sample_store();
        repo.save_progress(&store).await.unwrap();

        let raw = repo.get_raw(PROGRESS_KEY).unwrap().unwrap();
        assert!(raw.contains("\"completedSections\":[\"1-0\"]"));
        assert_eq!(repo.load_progress().await.unwrap(), Some(store));
    }

    #[tokio::test]
    async fn malformed_document_is_a_serialization_error() {
        let repo = InMemoryRepository::new();
        repo.put_raw(PROGRESS_KEY, "{not json").unwrap();
        let err = repo.load_progress().await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(ref msg) if msg.starts_with(PROGRESS_KEY)));
    }

    #[tokio::test]
    async fn clear_removes_both_documents() {
        let repo = InMemoryRepository::new();
        repo.save_progress(&sample_store()).await.unwrap();
        repo.save_sync_meta(&SyncMeta::default().touched(fixed_now()))
            .await
            .unwrap();

        repo.clear().await.unwrap();
        assert!(repo.load_progress().await.unwrap().is_none());
        assert!(repo.load_sync_meta().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unavailable_backend_always_fails() {
        let storage = Storage::unavailable();
        assert!(matches!(
            storage.progress.load_progress().await,
            Err(StorageError::Unavailable)
        ));
        assert!(matches!(
            storage.progress.clear().await,
            Err(StorageError::Unavailable)
        ));
    }
}

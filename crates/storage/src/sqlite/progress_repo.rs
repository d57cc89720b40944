use async_trait::async_trait;
use chrono::Utc;
use lab_core::model::{ProgressStore, SyncMeta};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::SqliteRepository;
use super::mapping::{conn, map_document_row};
use crate::repository::{
    PROGRESS_KEY, ProgressRepository, SYNC_META_KEY, StorageError, encode_document,
};

impl SqliteRepository {
    async fn load_document<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT body
            FROM progress_documents
            WHERE key = ?1
            ",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.map(|row| map_document_row(key, &row)).transpose()
    }

    async fn save_document<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let body = encode_document(value)?;
        sqlx::query(
            r"
            INSERT INTO progress_documents (key, body, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(body)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load_progress(&self) -> Result<Option<ProgressStore>, StorageError> {
        self.load_document(PROGRESS_KEY).await
    }

    async fn save_progress(&self, store: &ProgressStore) -> Result<(), StorageError> {
        self.save_document(PROGRESS_KEY, store).await
    }

    async fn load_sync_meta(&self) -> Result<Option<SyncMeta>, StorageError> {
        self.load_document(SYNC_META_KEY).await
    }

    async fn save_sync_meta(&self, meta: &SyncMeta) -> Result<(), StorageError> {
        self.save_document(SYNC_META_KEY, meta).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM progress_documents WHERE key IN (?1, ?2)")
            .bind(PROGRESS_KEY)
            .bind(SYNC_META_KEY)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ChapterId, UserId};
use crate::model::store::ProgressStore;

/// Format version written into every export.
pub const EXPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ImportError {
    #[error("import payload has no `progress` field")]
    MissingProgress,

    #[error("import payload `progress` is malformed: {0}")]
    MalformedProgress(#[source] serde_json::Error),

    #[error("{chapter} reports progress {progress}, above 100")]
    ProgressOutOfRange { chapter: ChapterId, progress: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMeta {
    pub export_date: DateTime<Utc>,
    pub version: String,
    pub user_id: UserId,
}

/// Portable snapshot of a learner's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressExport {
    pub meta: ExportMeta,
    pub progress: ProgressStore,
}

impl ProgressExport {
    #[must_use]
    pub fn new(user_id: UserId, progress: ProgressStore, exported_at: DateTime<Utc>) -> Self {
        Self {
            meta: ExportMeta {
                export_date: exported_at,
                version: EXPORT_VERSION.to_owned(),
                user_id,
            },
            progress,
        }
    }

    /// Extract the progress store from an untyped import document.
    ///
    /// Only `progress` is required; `meta` is informational.
    ///
    /// # Errors
    ///
    /// Returns `ImportError` if `progress` is absent, does not describe a
    /// store, or holds a record above 100 percent.
    pub fn progress_from_value(payload: &serde_json::Value) -> Result<ProgressStore, ImportError> {
        let progress = payload
            .get("progress")
            .filter(|value| !value.is_null())
            .ok_or(ImportError::MissingProgress)?;
        let store = ProgressStore::deserialize(progress).map_err(ImportError::MalformedProgress)?;
        if let Some((chapter, record)) = store.iter().find(|(_, record)| record.progress > 100) {
            return Err(ImportError::ProgressOutOfRange {
                chapter: chapter.clone(),
                progress: record.progress,
            });
        }
        Ok(store)
    }
}

/// Suggested file name for an export made on `date`.
#[must_use]
pub fn export_file_name(date: NaiveDate) -> String {
    format!("problab-progress-{}.json", date.format("%Y-%m-%d"))
}

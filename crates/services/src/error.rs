//! Shared error types for the services crate.

use thiserror::Error;

use lab_core::model::ImportError;
use storage::remote::RemoteSyncError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors raised inside `ProgressService` before they are logged and degraded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Remote(#[from] RemoteSyncError),
    #[error(transparent)]
    Import(#[from] ImportError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

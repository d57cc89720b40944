use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{StorageError, decode_document};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Decode the `body` column of a `progress_documents` row.
pub(crate) fn map_document_row<T: DeserializeOwned>(
    key: &str,
    row: &SqliteRow,
) -> Result<T, StorageError> {
    let body: String = row.try_get("body").map_err(ser)?;
    decode_document(key, &body)
}

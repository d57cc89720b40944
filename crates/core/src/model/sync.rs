use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracks whether local mutations still need to reach a remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_local_update: Option<DateTime<Utc>>,
    pub pending_sync: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncMeta {
    /// Record a local mutation at `now`.
    #[must_use]
    pub fn touched(self, now: DateTime<Utc>) -> Self {
        Self {
            last_local_update: Some(now),
            pending_sync: true,
            ..self
        }
    }

    /// Record a successful push to the remote store at `now`.
    #[must_use]
    pub fn synced(self, now: DateTime<Utc>) -> Self {
        Self {
            pending_sync: false,
            last_sync: Some(now),
            ..self
        }
    }
}

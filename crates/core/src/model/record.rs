use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::course::percent_complete;
use crate::model::ids::SectionId;

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of a chapter for one learner.
///
/// Moves forward only: `NotStarted -> InProgress -> Completed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    /// Promote a chapter that has not been started; later states are kept.
    #[must_use]
    pub fn started(self) -> Self {
        match self {
            ProgressStatus::NotStarted => ProgressStatus::InProgress,
            other => other,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }
}

//
// ─── RECORD ────────────────────────────────────────────────────────────────────
//

/// Progress of a single chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    #[serde(default)]
    pub status: ProgressStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub completed_sections: BTreeSet<SectionId>,
    #[serde(default)]
    pub last_visited: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_spent: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
}

impl ProgressRecord {
    #[must_use]
    pub fn is_section_completed(&self, section: &SectionId) -> bool {
        self.completed_sections.contains(section)
    }

    /// Most recent moment the chapter was touched, if ever.
    #[must_use]
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match (self.last_updated, self.last_visited) {
            (Some(updated), Some(visited)) => Some(updated.max(visited)),
            (updated, visited) => updated.or(visited),
        }
    }

    /// Shallow-merge `patch` into this record.
    ///
    /// Fields present in the patch overwrite the stored ones, with two derived
    /// rules: a supplied section set recomputes `progress` against
    /// `total_sections`, and `time_spent` never decreases.
    #[must_use]
    pub fn apply_patch(mut self, patch: ProgressPatch, now: DateTime<Utc>, total_sections: u32) -> Self {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress.min(100);
        }
        if let Some(sections) = patch.completed_sections {
            self.progress = percent_complete(sections.len(), total_sections);
            self.completed_sections = sections;
        }
        if let Some(visited) = patch.last_visited {
            self.last_visited = Some(visited);
        }
        if let Some(time_spent) = patch.time_spent {
            self.time_spent = self.time_spent.max(time_spent);
        }
        if let Some(score) = patch.score {
            self.score = Some(score);
        }
        self.last_updated = Some(now);
        self
    }
}

//
// ─── PATCH ─────────────────────────────────────────────────────────────────────
//

/// Partial update for a `ProgressRecord`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressPatch {
    pub status: Option<ProgressStatus>,
    pub progress: Option<u8>,
    pub completed_sections: Option<BTreeSet<SectionId>>,
    pub last_visited: Option<DateTime<Utc>>,
    pub time_spent: Option<u64>,
    pub score: Option<i64>,
}

impl ProgressPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(mut self, status: ProgressStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub fn completed_sections(mut self, sections: BTreeSet<SectionId>) -> Self {
        self.completed_sections = Some(sections);
        self
    }

    #[must_use]
    pub fn last_visited(mut self, at: DateTime<Utc>) -> Self {
        self.last_visited = Some(at);
        self
    }

    #[must_use]
    pub fn time_spent(mut self, seconds: u64) -> Self {
        self.time_spent = Some(seconds);
        self
    }

    #[must_use]
    pub fn score(mut self, score: i64) -> Self {
        self.score = Some(score);
        self
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::ChapterId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourseConfigError {
    #[error("failed to parse course config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("total chapters must be > 0")]
    InvalidTotalChapters,

    #[error("default section count must be > 0")]
    InvalidDefaultSections,

    #[error("chapter {chapter} must have at least one section")]
    InvalidSectionCount { chapter: String },
}

//
// ─── AVERAGING POLICY ──────────────────────────────────────────────────────────
//

/// Denominator used when averaging chapter progress into an overall figure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AveragePolicy {
    /// Average only over chapters that have a stored record.
    #[default]
    PresentChapters,
    /// Average over `total_chapters`, counting unvisited chapters as zero.
    AllChapters,
}

//
// ─── COURSE CONFIG ─────────────────────────────────────────────────────────────
//

const DEFAULT_TOTAL_CHAPTERS: u32 = 7;
const DEFAULT_SECTIONS: u32 = 10;

const DEFAULT_SECTION_TABLE: [(&str, u32); 7] = [
    ("chapter-1", 12),
    ("chapter-2", 15),
    ("chapter-3", 10),
    ("chapter-4", 14),
    ("chapter-5", 16),
    ("chapter-6", 18),
    ("chapter-7", 20),
];

/// Shape of the course: how many chapters exist and how many sections each holds.
///
/// Section totals drive the derived `progress` percentage of a chapter, so they
/// live in configuration instead of being baked into the progress logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseConfig {
    total_chapters: u32,
    default_sections: u32,
    average_over: AveragePolicy,
    sections: BTreeMap<String, u32>,
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            total_chapters: DEFAULT_TOTAL_CHAPTERS,
            default_sections: DEFAULT_SECTIONS,
            average_over: AveragePolicy::default(),
            sections: DEFAULT_SECTION_TABLE
                .iter()
                .map(|(chapter, total)| ((*chapter).to_owned(), *total))
                .collect(),
        }
    }
}

impl CourseConfig {
    /// Parse and validate a TOML course description.
    ///
    /// Missing keys fall back to the built-in course.
    ///
    /// # Errors
    ///
    /// Returns `CourseConfigError` if the document is not valid TOML or
    /// contains zero-sized counts.
    pub fn from_toml_str(raw: &str) -> Result<Self, CourseConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()
    }

    /// Check the counts used as divisors.
    ///
    /// # Errors
    ///
    /// Returns `CourseConfigError` for any zero count.
    pub fn validate(self) -> Result<Self, CourseConfigError> {
        if self.total_chapters == 0 {
            return Err(CourseConfigError::InvalidTotalChapters);
        }
        if self.default_sections == 0 {
            return Err(CourseConfigError::InvalidDefaultSections);
        }
        if let Some((chapter, _)) = self.sections.iter().find(|(_, total)| **total == 0) {
            return Err(CourseConfigError::InvalidSectionCount {
                chapter: chapter.clone(),
            });
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_average_policy(mut self, policy: AveragePolicy) -> Self {
        self.average_over = policy;
        self
    }

    #[must_use]
    pub fn with_sections(mut self, chapter: &ChapterId, total: u32) -> Self {
        self.sections.insert(chapter.as_str().to_owned(), total.max(1));
        self
    }

    #[must_use]
    pub fn total_chapters(&self) -> u32 {
        self.total_chapters
    }

    #[must_use]
    pub fn average_policy(&self) -> AveragePolicy {
        self.average_over
    }

    /// Number of sections in a chapter, falling back to the default for unknown chapters.
    #[must_use]
    pub fn sections_for(&self, chapter: &ChapterId) -> u32 {
        self.sections
            .get(chapter.as_str())
            .copied()
            .unwrap_or(self.default_sections)
    }
}

/// Percentage of `total` covered by `completed`, rounded half up and capped at 100.
#[must_use]
pub fn percent_complete(completed: usize, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = u64::try_from(completed).unwrap_or(u64::MAX);
    let total = u64::from(total);
    let rounded = completed
        .saturating_mul(200)
        .saturating_add(total)
        / (2 * total);
    u8::try_from(rounded.min(100)).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_course() {
        let config = CourseConfig::default();
        assert_eq!(config.total_chapters(), 7);
        assert_eq!(config.sections_for(&ChapterId::new("chapter-1")), 12);
        assert_eq!(config.sections_for(&ChapterId::new("chapter-7")), 20);
        assert_eq!(config.sections_for(&ChapterId::new("appendix")), 10);
        assert_eq!(config.average_policy(), AveragePolicy::PresentChapters);
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent_complete(1, 12), 8);
        assert_eq!(percent_complete(1, 8), 13);
        assert_eq!(percent_complete(6, 12), 50);
        assert_eq!(percent_complete(12, 12), 100);
    }

    #[test]
    fn percent_caps_at_one_hundred() {
        assert_eq!(percent_complete(30, 12), 100);
        assert_eq!(percent_complete(3, 0), 0);
    }

    #[test]
    fn toml_overrides_merge_with_defaults() {
        let config = CourseConfig::from_toml_str(
            r#"
            total_chapters = 8
            average_over = "all_chapters"

            [sections]
            chapter-1 = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.total_chapters(), 8);
        assert_eq!(config.average_policy(), AveragePolicy::AllChapters);
        assert_eq!(config.sections_for(&ChapterId::new("chapter-1")), 4);
        // A `[sections]` table replaces the built-in one entirely.
        assert_eq!(config.sections_for(&ChapterId::new("chapter-2")), 10);
    }

    #[test]
    fn toml_rejects_zero_counts() {
        let err = CourseConfig::from_toml_str("total_chapters = 0").unwrap_err();
        assert!(matches!(err, CourseConfigError::InvalidTotalChapters));

        let err = CourseConfig::from_toml_str("[sections]\nchapter-9 = 0").unwrap_err();
        assert!(matches!(
            err,
            CourseConfigError::InvalidSectionCount { ref chapter } if chapter == "chapter-9"
        ));
    }

    #[test]
    fn toml_rejects_garbage() {
        let err = CourseConfig::from_toml_str("total_chapters = [").unwrap_err();
        assert!(matches!(err, CourseConfigError::Parse(_)));
    }
}

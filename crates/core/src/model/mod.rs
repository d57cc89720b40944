mod course;
mod export;
mod ids;
mod record;
mod store;
mod sync;

pub use course::{AveragePolicy, CourseConfig, CourseConfigError, percent_complete};
pub use export::{EXPORT_VERSION, ExportMeta, ImportError, ProgressExport, export_file_name};
pub use ids::{ChapterId, ParseIdError, SectionId, UserId};
pub use record::{ProgressPatch, ProgressRecord, ProgressStatus};
pub use store::{OverallProgress, ProgressStore};
pub use sync::SyncMeta;

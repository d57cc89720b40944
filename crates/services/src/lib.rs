#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod progress_service;
pub mod tracker;

pub use lab_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, ProgressServiceError};
pub use progress_service::{ProgressService, SyncOutcome};
pub use tracker::{ChapterProgress, ProgressStats, ProgressTracker};

// Custom error types for better error handling and debugging
//
// Using thiserror for ergonomic error definitions with:
// - Context preservation
// - Type-safe error matching
// - Automatic Display/Error trait implementations
// - Source error chaining

use thiserror::Error;

use crate::core::types::{JobId, JobStatus, PageId, SymbolId};

/// Detection/preprocessing errors. All page-scoped: a failing page marks the
/// job failed but never rolls back symbols already written for earlier pages.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("failed to read image for page {page_id}: {source}")]
    ImageRead {
        page_id: PageId,
        #[source]
        source: image::ImageError,
    },

    #[error("page {page_id} has invalid dimensions {width}x{height}")]
    InvalidImageSize {
        page_id: PageId,
        width: u32,
        height: u32,
    },
}

/// Symbol repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("symbol {0} not found")]
    SymbolNotFound(SymbolId),

    #[error("category must be non-empty")]
    EmptyCategory,

    #[error("failed to persist symbol snapshot to {path}: {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Job manager errors. Validation and conflict variants surface
/// synchronously at start time; everything else is recorded on the job and
/// observed by polling.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid extraction parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid page range [{start}, {end}]: {reason}")]
    InvalidPageRange {
        start: PageId,
        end: PageId,
        reason: String,
    },

    #[error("page {page_id} is held by non-terminal job {job_id}")]
    PageBusy { page_id: PageId, job_id: JobId },

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("job {job_id} is already terminal ({status:?})")]
    AlreadyTerminal { job_id: JobId, status: JobStatus },

    #[error("illegal status transition {from:?} -> {to:?} for job {job_id}")]
    IllegalTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Per-page pipeline errors, composing the service errors with page context
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("page {0} not found in page store")]
    PageNotFound(PageId),

    #[error("detection failed on page {page_id}: {source}")]
    Detection {
        page_id: PageId,
        #[source]
        source: DetectionError,
    },

    #[error("repository write failed on page {page_id}: {source}")]
    Repository {
        page_id: PageId,
        #[source]
        source: RepositoryError,
    },

    #[error("task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("margin fraction must be in [0.0, 0.4], got {0}")]
    InvalidMarginFraction(f32),

    #[error("overlap merge threshold must be in (0.0, 1.0], got {0}")]
    InvalidOverlapThreshold(f32),

    #[error("adaptive block radius must be in [1, 64], got {0}")]
    InvalidBlockRadius(u32),

    #[error("invalid job config: {0}")]
    InvalidJobConfig(String),

    #[error("invalid data dir: {0}")]
    InvalidDataDir(String),
}

// Convenience type aliases for Results
pub type DetectionResult<T> = Result<T, DetectionError>;
pub type RepositoryResult<T> = Result<T, RepositoryError>;
pub type JobResult<T> = Result<T, JobError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

// Helper trait for attaching page context when service errors cross into
// the pipeline
pub trait PageContext<T> {
    fn on_page(self, page_id: PageId) -> PipelineResult<T>;
}

impl<T> PageContext<T> for DetectionResult<T> {
    fn on_page(self, page_id: PageId) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::Detection { page_id, source })
    }
}

impl<T> PageContext<T> for RepositoryResult<T> {
    fn on_page(self, page_id: PageId) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::Repository { page_id, source })
    }
}

pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{ConfigError, DetectionError, JobError, PipelineError, RepositoryError};
pub use types::{
    BoundingBox, BulkCategorizeOutcome, ExtractionJob, ExtractionParameters, JobEvent, JobStatus,
    Page, Symbol, SymbolDraft, SymbolFilter,
};

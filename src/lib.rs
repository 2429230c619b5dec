// Library exports for the manuscript symbol extraction workflow

// Core modules
pub mod core;
pub mod orchestration;
pub mod repository;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use self::core::{
    config::Config,
    errors::{ConfigError, DetectionError, JobError, PipelineError, RepositoryError},
    types::{
        BoundingBox, BulkCategorizeOutcome, ExtractionJob, ExtractionParameters, JobEvent,
        JobStatus, Page, Symbol, SymbolFilter,
    },
};

pub use orchestration::{JobManager, PagePipeline};

pub use repository::SymbolRepository;

pub use services::{
    ClassificationService, Detector, InMemoryPageStore, PageCache, PageStore, Preprocessor,
    RegionFilter,
};

pub use utils::{crop_and_encode_png_async, load_image_from_memory_async, Metrics};

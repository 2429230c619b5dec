pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{crop_and_encode_png_async, load_image_from_memory_async};
pub use metrics::Metrics;

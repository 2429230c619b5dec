use crate::core::errors::ConfigError;
use std::env;
use std::path::Path;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// Detection configuration: fixed knobs of the pipeline that are not part
/// of the per-job parameter set.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Neighborhood radius for the adaptive threshold method.
    pub adaptive_block_radius: u32,
    /// Fraction of each page edge excluded when ignore_margins is set.
    pub margin_fraction: f32,
    /// Overlap ratio above which fragment boxes are merged.
    pub overlap_merge_threshold: f32,
}

/// Job manager configuration
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Maximum jobs executing concurrently (further starts stay Queued).
    pub max_concurrent_jobs: usize,
    /// Upper bound on pages per job, to keep single jobs from monopolizing
    /// the manuscript.
    pub max_pages_per_job: usize,
    /// Buffer size of the job event broadcast channel.
    pub event_buffer: usize,
}

/// Repository configuration
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub data_dir: String,
    /// Debounce interval for snapshot persistence, in seconds. 0 disables
    /// the background save task.
    pub save_interval_secs: u64,
}

/// Page store configuration
#[derive(Debug, Clone)]
pub struct PagesConfig {
    /// Directory scanned at startup for page images. Empty = no preload.
    pub pages_dir: Option<String>,
    /// Decoded-image LRU cache capacity.
    pub decoded_cache_size: usize,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub detection: DetectionConfig,
    pub jobs: JobConfig,
    pub repository: RepositoryConfig,
    pub pages: PagesConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        // Parse log level
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        Self {
            server: ServerConfig {
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(7400),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
            },
            detection: DetectionConfig {
                adaptive_block_radius: env::var("ADAPTIVE_BLOCK_RADIUS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(12),
                margin_fraction: env::var("MARGIN_FRACTION")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.05),
                overlap_merge_threshold: env::var("OVERLAP_MERGE_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.5),
            },
            jobs: JobConfig {
                max_concurrent_jobs: env::var("MAX_CONCURRENT_JOBS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(num_cpus::get),
                max_pages_per_job: env::var("MAX_PAGES_PER_JOB")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
                event_buffer: env::var("JOB_EVENT_BUFFER")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(256),
            },
            repository: RepositoryConfig {
                data_dir: env::var("DATA_DIR").unwrap_or_else(|_| ".data".to_string()),
                save_interval_secs: env::var("SNAPSHOT_SAVE_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            pages: PagesConfig {
                pages_dir: env::var("PAGES_DIR").ok().filter(|s| !s.is_empty()),
                decoded_cache_size: env::var("DECODED_CACHE_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(64),
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=0.4).contains(&self.detection.margin_fraction) {
            return Err(ConfigError::InvalidMarginFraction(
                self.detection.margin_fraction,
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.overlap_merge_threshold)
            || self.detection.overlap_merge_threshold == 0.0
        {
            return Err(ConfigError::InvalidOverlapThreshold(
                self.detection.overlap_merge_threshold,
            ));
        }

        if !(1..=64).contains(&self.detection.adaptive_block_radius) {
            return Err(ConfigError::InvalidBlockRadius(
                self.detection.adaptive_block_radius,
            ));
        }

        if self.jobs.max_concurrent_jobs == 0 {
            return Err(ConfigError::InvalidJobConfig(
                "max_concurrent_jobs must be > 0".to_string(),
            ));
        }
        if self.jobs.max_pages_per_job == 0 {
            return Err(ConfigError::InvalidJobConfig(
                "max_pages_per_job must be > 0".to_string(),
            ));
        }
        if self.jobs.event_buffer == 0 {
            return Err(ConfigError::InvalidJobConfig(
                "event_buffer must be > 0".to_string(),
            ));
        }

        if self.pages.decoded_cache_size == 0 {
            return Err(ConfigError::InvalidJobConfig(
                "decoded_cache_size must be > 0".to_string(),
            ));
        }

        // Validate data directory parent exists
        let data_path = Path::new(&self.repository.data_dir);
        if let Some(parent) = data_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidDataDir(format!(
                    "parent directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn adaptive_block_radius(&self) -> u32 {
        self.detection.adaptive_block_radius
    }

    pub fn margin_fraction(&self) -> f32 {
        self.detection.margin_fraction
    }

    pub fn overlap_merge_threshold(&self) -> f32 {
        self.detection.overlap_merge_threshold
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.jobs.max_concurrent_jobs
    }

    pub fn max_pages_per_job(&self) -> usize {
        self.jobs.max_pages_per_job
    }

    pub fn event_buffer(&self) -> usize {
        self.jobs.event_buffer
    }

    pub fn data_dir(&self) -> &str {
        &self.repository.data_dir
    }

    pub fn save_interval_secs(&self) -> u64 {
        self.repository.save_interval_secs
    }

    pub fn pages_dir(&self) -> Option<&str> {
        self.pages.pages_dir.as_deref()
    }

    pub fn decoded_cache_size(&self) -> usize {
        self.pages.decoded_cache_size
    }
}

// Note: No Default implementation because Config::new() can fail
// Users should explicitly call Config::new()? and handle errors

/// Fixed config for unit tests, bypassing the process environment (which is
/// shared across the test binary).
#[cfg(test)]
pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            port: 7400,
            host: "127.0.0.1".to_string(),
            log_level: Level::INFO,
        },
        detection: DetectionConfig {
            adaptive_block_radius: 12,
            margin_fraction: 0.05,
            overlap_merge_threshold: 0.5,
        },
        jobs: JobConfig {
            max_concurrent_jobs: 2,
            max_pages_per_job: 100,
            event_buffer: 256,
        },
        repository: RepositoryConfig {
            data_dir: ".data".to_string(),
            save_interval_secs: 0,
        },
        pages: PagesConfig {
            pages_dir: None,
            decoded_cache_size: 8,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        test_config()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_margin_fraction_bounds() {
        let mut config = base_config();
        config.detection.margin_fraction = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMarginFraction(_))
        ));
    }

    #[test]
    fn test_overlap_threshold_bounds() {
        let mut config = base_config();
        config.detection.overlap_merge_threshold = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOverlapThreshold(_))
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = base_config();
        config.jobs.max_concurrent_jobs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidJobConfig(_))
        ));
    }
}

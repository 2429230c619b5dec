use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics collector for the extraction subsystem.
///
/// Tracks job lifecycle counts, per-stage durations, symbol throughput, and
/// per-endpoint request counters. Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Job lifecycle
    jobs_started: AtomicUsize,
    jobs_completed: AtomicUsize,
    jobs_failed: AtomicUsize,
    jobs_cancelled: AtomicUsize,

    // Page throughput
    pages_processed: AtomicUsize,
    pages_failed: AtomicUsize,
    symbols_extracted: AtomicU64,
    symbols_categorized: AtomicU64,

    // Stage durations (per page)
    preprocess_duration_ms: RwLock<Vec<u64>>,
    detect_duration_ms: RwLock<Vec<u64>>,
    feature_duration_ms: RwLock<Vec<u64>>,
    persist_duration_ms: RwLock<Vec<u64>>,

    // Per-endpoint request counters
    endpoint_counters: DashMap<String, AtomicUsize>,

    // Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                jobs_started: AtomicUsize::new(0),
                jobs_completed: AtomicUsize::new(0),
                jobs_failed: AtomicUsize::new(0),
                jobs_cancelled: AtomicUsize::new(0),
                pages_processed: AtomicUsize::new(0),
                pages_failed: AtomicUsize::new(0),
                symbols_extracted: AtomicU64::new(0),
                symbols_categorized: AtomicU64::new(0),
                preprocess_duration_ms: RwLock::new(Vec::new()),
                detect_duration_ms: RwLock::new(Vec::new()),
                feature_duration_ms: RwLock::new(Vec::new()),
                persist_duration_ms: RwLock::new(Vec::new()),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    // Job metrics
    pub fn record_job_started(&self) {
        self.inner.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_completed(&self) {
        self.inner.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_failed(&self) {
        self.inner.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_cancelled(&self) {
        self.inner.jobs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    // Page metrics
    pub fn record_page_processed(&self, symbols: usize) {
        self.inner.pages_processed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .symbols_extracted
            .fetch_add(symbols as u64, Ordering::Relaxed);
    }

    pub fn record_page_failed(&self) {
        self.inner.pages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_symbols_categorized(&self, count: usize) {
        self.inner
            .symbols_categorized
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    // Stage durations
    pub fn record_preprocess_duration(&self, duration: Duration) {
        self.inner
            .preprocess_duration_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_detect_duration(&self, duration: Duration) {
        self.inner
            .detect_duration_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_feature_duration(&self, duration: Duration) {
        self.inner
            .feature_duration_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_persist_duration(&self, duration: Duration) {
        self.inner
            .persist_duration_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    // Endpoint metrics
    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let preprocess = self.inner.preprocess_duration_ms.read();
        let preprocess_avg = avg(&preprocess);
        drop(preprocess);

        let detect = self.inner.detect_duration_ms.read();
        let detect_avg = avg(&detect);
        let detect_p95 = percentile(&detect, 0.95);
        drop(detect);

        let feature = self.inner.feature_duration_ms.read();
        let feature_avg = avg(&feature);
        drop(feature);

        let persist = self.inner.persist_duration_ms.read();
        let persist_avg = avg(&persist);
        drop(persist);

        let endpoints = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            jobs_started: self.inner.jobs_started.load(Ordering::Relaxed),
            jobs_completed: self.inner.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.inner.jobs_failed.load(Ordering::Relaxed),
            jobs_cancelled: self.inner.jobs_cancelled.load(Ordering::Relaxed),
            pages_processed: self.inner.pages_processed.load(Ordering::Relaxed),
            pages_failed: self.inner.pages_failed.load(Ordering::Relaxed),
            symbols_extracted: self.inner.symbols_extracted.load(Ordering::Relaxed),
            symbols_categorized: self.inner.symbols_categorized.load(Ordering::Relaxed),
            preprocess_avg_ms: preprocess_avg,
            detect_avg_ms: detect_avg,
            detect_p95_ms: detect_p95,
            feature_avg_ms: feature_avg,
            persist_avg_ms: persist_avg,
            endpoints,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP extraction_jobs_started_total Total extraction jobs started
# TYPE extraction_jobs_started_total counter
extraction_jobs_started_total {{}} {}

# HELP extraction_jobs_completed_total Extraction jobs that completed
# TYPE extraction_jobs_completed_total counter
extraction_jobs_completed_total {{}} {}

# HELP extraction_jobs_failed_total Extraction jobs that failed
# TYPE extraction_jobs_failed_total counter
extraction_jobs_failed_total {{}} {}

# HELP extraction_jobs_cancelled_total Extraction jobs that were cancelled
# TYPE extraction_jobs_cancelled_total counter
extraction_jobs_cancelled_total {{}} {}

# HELP pages_processed_total Pages fully processed
# TYPE pages_processed_total counter
pages_processed_total {{}} {}

# HELP pages_failed_total Pages whose contribution failed
# TYPE pages_failed_total counter
pages_failed_total {{}} {}

# HELP symbols_extracted_total Symbols persisted by extraction
# TYPE symbols_extracted_total counter
symbols_extracted_total {{}} {}

# HELP symbols_categorized_total Symbols whose category changed
# TYPE symbols_categorized_total counter
symbols_categorized_total {{}} {}

# HELP stage_avg_duration_ms Average per-page stage duration in milliseconds
# TYPE stage_avg_duration_ms gauge
stage_avg_duration_ms {{stage="preprocess"}} {}
stage_avg_duration_ms {{stage="detect"}} {}
stage_avg_duration_ms {{stage="feature"}} {}
stage_avg_duration_ms {{stage="persist"}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            snapshot.jobs_started,
            snapshot.jobs_completed,
            snapshot.jobs_failed,
            snapshot.jobs_cancelled,
            snapshot.pages_processed,
            snapshot.pages_failed,
            snapshot.symbols_extracted,
            snapshot.symbols_categorized,
            snapshot.preprocess_avg_ms,
            snapshot.detect_avg_ms,
            snapshot.feature_avg_ms,
            snapshot.persist_avg_ms,
            snapshot.uptime_seconds,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub jobs_started: usize,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    pub jobs_cancelled: usize,
    pub pages_processed: usize,
    pub pages_failed: usize,
    pub symbols_extracted: u64,
    pub symbols_categorized: u64,
    pub preprocess_avg_ms: u64,
    pub detect_avg_ms: u64,
    pub detect_p95_ms: u64,
    pub feature_avg_ms: u64,
    pub persist_avg_ms: u64,
    pub endpoints: std::collections::HashMap<String, usize>,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_job_started();
        metrics.record_job_completed();
        metrics.record_page_processed(12);
        metrics.record_page_processed(3);
        metrics.record_page_failed();
        metrics.record_symbols_categorized(2);
        metrics.record_detect_duration(Duration::from_millis(40));
        metrics.record_detect_duration(Duration::from_millis(60));
        metrics.record_endpoint_request("start_extraction");
        metrics.record_endpoint_request("start_extraction");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_started, 1);
        assert_eq!(snapshot.jobs_completed, 1);
        assert_eq!(snapshot.pages_processed, 2);
        assert_eq!(snapshot.pages_failed, 1);
        assert_eq!(snapshot.symbols_extracted, 15);
        assert_eq!(snapshot.symbols_categorized, 2);
        assert_eq!(snapshot.detect_avg_ms, 50);
        assert_eq!(snapshot.endpoints.get("start_extraction"), Some(&2));
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_job_started();
        metrics.record_page_processed(7);

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("extraction_jobs_started_total {} 1"));
        assert!(prometheus.contains("symbols_extracted_total {} 7"));
    }
}

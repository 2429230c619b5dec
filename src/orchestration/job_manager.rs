// Extraction job manager: owns the job state machine, serializes page
// access, reports progress, and supports cooperative cancellation.
//
// Mutual exclusion is the one hard concurrency requirement: at most one
// non-terminal job per page, enforced by a check-and-create under a single
// write lock over the job table and the page-lock table. Execution is
// asynchronous; start() returns as soon as the job is queued.
//
// There is no global "current job": every state transition is published on
// a broadcast channel, and pollers read lock-guarded snapshots.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};
use tracing::{error, info, warn};

use crate::core::config::Config;
use crate::core::errors::{JobError, JobResult};
use crate::core::types::{
    ExtractionJob, ExtractionParameters, JobEvent, JobId, JobStatus, PageId,
};
use crate::orchestration::page_pipeline::{PagePipeline, PipelineStage};
use crate::services::page_store::PageStore;
use crate::utils::Metrics;

impl PipelineStage {
    fn as_status(self) -> JobStatus {
        match self {
            PipelineStage::Preprocessing => JobStatus::Preprocessing,
            PipelineStage::Detecting => JobStatus::Detecting,
            PipelineStage::FeatureExtraction => JobStatus::FeatureExtraction,
            PipelineStage::Classifying => JobStatus::Classifying,
        }
    }
}

#[derive(Default)]
struct JobTable {
    jobs: BTreeMap<JobId, ExtractionJob>,
    /// Which non-terminal job holds each page.
    page_locks: HashMap<PageId, JobId>,
    next_id: JobId,
}

impl JobTable {
    fn release_pages(&mut self, job_id: JobId) {
        self.page_locks.retain(|_, holder| *holder != job_id);
    }
}

struct ManagerInner {
    pipeline: PagePipeline,
    pages: Arc<dyn PageStore>,
    table: RwLock<JobTable>,
    cancel_flags: DashMap<JobId, Arc<AtomicBool>>,
    job_semaphore: Arc<Semaphore>,
    events: broadcast::Sender<JobEvent>,
    metrics: Metrics,
    max_pages_per_job: usize,
}

#[derive(Clone)]
pub struct JobManager {
    inner: Arc<ManagerInner>,
}

impl JobManager {
    pub fn new(
        config: Arc<Config>,
        pipeline: PagePipeline,
        pages: Arc<dyn PageStore>,
        metrics: Metrics,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer());
        Self {
            inner: Arc::new(ManagerInner {
                pipeline,
                pages,
                table: RwLock::new(JobTable::default()),
                cancel_flags: DashMap::new(),
                job_semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs())),
                events,
                metrics,
                max_pages_per_job: config.max_pages_per_job(),
            }),
        }
    }

    /// Create a job over the inclusive page id range and schedule it.
    ///
    /// Validation and conflicts surface here, synchronously; everything
    /// after this call is observed via polling or the event channel.
    pub fn start(
        &self,
        start_page: PageId,
        end_page: PageId,
        parameters: ExtractionParameters,
    ) -> JobResult<ExtractionJob> {
        validate_parameters(&parameters)?;

        if start_page > end_page {
            return Err(JobError::InvalidPageRange {
                start: start_page,
                end: end_page,
                reason: "start page is after end page".to_string(),
            });
        }

        // Ids need not be dense; the job covers the pages that exist.
        let page_ids = self.inner.pages.ids_in_range(start_page, end_page);
        if page_ids.is_empty() {
            return Err(JobError::InvalidPageRange {
                start: start_page,
                end: end_page,
                reason: "no pages in range".to_string(),
            });
        }
        if page_ids.len() > self.inner.max_pages_per_job {
            return Err(JobError::InvalidPageRange {
                start: start_page,
                end: end_page,
                reason: format!(
                    "range covers {} pages, limit is {}",
                    page_ids.len(),
                    self.inner.max_pages_per_job
                ),
            });
        }

        // Atomic check-and-create: conflict check, job row, and page claims
        // all happen under one write-lock hold.
        let job = {
            let mut table = self.inner.table.write();
            for page_id in &page_ids {
                if let Some(holder) = table.page_locks.get(page_id) {
                    return Err(JobError::PageBusy {
                        page_id: *page_id,
                        job_id: *holder,
                    });
                }
            }

            table.next_id += 1;
            let job = ExtractionJob {
                id: table.next_id,
                start_page,
                end_page,
                parameters: parameters.clone(),
                status: JobStatus::Queued,
                progress: 0.0,
                symbols_extracted: 0,
                started_at: Utc::now(),
                completed_at: None,
                error: None,
            };
            for page_id in &page_ids {
                table.page_locks.insert(*page_id, job.id);
            }
            table.jobs.insert(job.id, job.clone());
            job
        };

        let cancel = Arc::new(AtomicBool::new(false));
        self.inner.cancel_flags.insert(job.id, Arc::clone(&cancel));
        self.inner.metrics.record_job_started();
        self.inner.publish(&job);

        info!(
            job_id = job.id,
            pages = page_ids.len(),
            parameters = %format!("{:016x}", parameters.fingerprint()),
            "extraction job queued"
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_job(inner, job.id, page_ids, parameters, cancel));

        Ok(job)
    }

    /// Request cancellation. A queued job is cancelled immediately; a
    /// running job finishes its in-flight page and stops before the next
    /// one (cooperative, never preemptive mid-page). Symbols already
    /// written are retained.
    pub fn cancel(&self, job_id: JobId) -> JobResult<ExtractionJob> {
        let mut table = self.inner.table.write();
        let job = table
            .jobs
            .get_mut(&job_id)
            .ok_or(JobError::JobNotFound(job_id))?;

        if job.status.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                job_id,
                status: job.status,
            });
        }

        if let Some(flag) = self.inner.cancel_flags.get(&job_id) {
            flag.store(true, Ordering::Relaxed);
        }

        if job.status == JobStatus::Queued {
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(Utc::now());
            let snapshot = job.clone();
            table.release_pages(job_id);
            drop(table);

            self.inner.cancel_flags.remove(&job_id);
            self.inner.metrics.record_job_cancelled();
            self.inner.publish(&snapshot);
            info!(job_id, "queued job cancelled");
            return Ok(snapshot);
        }

        // In-progress: the runner observes the flag between pages and
        // performs the terminal transition itself.
        info!(job_id, "cancellation requested");
        Ok(job.clone())
    }

    pub fn get(&self, job_id: JobId) -> JobResult<ExtractionJob> {
        self.inner
            .table
            .read()
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(JobError::JobNotFound(job_id))
    }

    /// All jobs, newest first. Jobs are retained after completion for
    /// history/audit.
    pub fn list(&self) -> Vec<ExtractionJob> {
        self.inner.table.read().jobs.values().rev().cloned().collect()
    }

    /// Subscribe to job state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }
}

impl ManagerInner {
    fn publish(&self, job: &ExtractionJob) {
        // No receivers is fine; events are best-effort observation.
        let _ = self.events.send(JobEvent {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            symbols_extracted: job.symbols_extracted,
        });
    }

    /// Move a running job through a per-page pipeline stage.
    fn set_stage(&self, job_id: JobId, status: JobStatus) {
        let mut table = self.table.write();
        let Some(job) = table.jobs.get_mut(&job_id) else {
            return;
        };
        // A cancel can land between the stage callback firing and this
        // lock; the terminal state wins.
        if job.status.is_terminal() {
            return;
        }
        if !job.status.can_transition(status) {
            warn!(job_id, from = ?job.status, to = ?status, "ignoring illegal stage transition");
            return;
        }
        job.status = status;
        let snapshot = job.clone();
        drop(table);
        self.publish(&snapshot);
    }

    /// Record one fully processed page.
    fn advance_progress(&self, job_id: JobId, processed: usize, total: usize, symbols: usize) {
        let mut table = self.table.write();
        let Some(job) = table.jobs.get_mut(&job_id) else {
            return;
        };
        if job.status.is_terminal() {
            return;
        }
        job.symbols_extracted += symbols;
        // Monotonic by construction: processed only grows.
        job.progress = (processed as f32 / total as f32) * 100.0;
        let snapshot = job.clone();
        drop(table);
        self.publish(&snapshot);
    }

    /// Terminal transition. Idempotent: a job already terminal (queued
    /// cancel racing the runner) is left untouched.
    fn finish(&self, job_id: JobId, status: JobStatus, error: Option<String>) {
        let mut table = self.table.write();
        let Some(job) = table.jobs.get_mut(&job_id) else {
            return;
        };
        if job.status.is_terminal() {
            self.cancel_flags.remove(&job_id);
            return;
        }

        job.status = status;
        job.completed_at = Some(Utc::now());
        if status == JobStatus::Completed {
            job.progress = 100.0;
        }
        job.error = error;
        let snapshot = job.clone();
        table.release_pages(job_id);
        drop(table);

        self.cancel_flags.remove(&job_id);
        match status {
            JobStatus::Completed => self.metrics.record_job_completed(),
            JobStatus::Failed => self.metrics.record_job_failed(),
            JobStatus::Cancelled => self.metrics.record_job_cancelled(),
            _ => {}
        }
        self.publish(&snapshot);
    }
}

/// Background execution of one job: pages strictly in sequence, cancel flag
/// observed between pages, first page error fails the job without rolling
/// back earlier pages.
async fn run_job(
    inner: Arc<ManagerInner>,
    job_id: JobId,
    page_ids: Vec<PageId>,
    parameters: ExtractionParameters,
    cancel: Arc<AtomicBool>,
) {
    let _permit = match Arc::clone(&inner.job_semaphore).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return, // semaphore closed: shutting down
    };

    let total = page_ids.len();
    for (index, page_id) in page_ids.into_iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            info!(job_id, "job cancelled between pages");
            inner.finish(job_id, JobStatus::Cancelled, None);
            return;
        }

        let Some(page) = inner.pages.get(page_id) else {
            // Pages vanished out from under the job; treat as page-scoped
            // failure like an unreadable image.
            inner.metrics.record_page_failed();
            inner.finish(
                job_id,
                JobStatus::Failed,
                Some(format!("page {page_id} not found in page store")),
            );
            return;
        };

        let stage_inner = Arc::clone(&inner);
        let observer = move |stage: PipelineStage| {
            stage_inner.set_stage(job_id, stage.as_status());
        };

        match inner.pipeline.execute(&page, &parameters, &observer).await {
            Ok(outcome) => {
                inner.advance_progress(job_id, index + 1, total, outcome.symbols.len());
            }
            Err(e) => {
                error!(job_id, page_id, "page extraction failed: {e}");
                inner.metrics.record_page_failed();
                inner.finish(job_id, JobStatus::Failed, Some(e.to_string()));
                return;
            }
        }
    }

    inner.finish(job_id, JobStatus::Completed, None);
    info!(job_id, pages = total, "extraction job completed");
}

fn validate_parameters(parameters: &ExtractionParameters) -> JobResult<()> {
    if parameters.min_symbol_size == 0 {
        return Err(JobError::InvalidParameters(
            "minimum symbol size must be at least 1 pixel".to_string(),
        ));
    }
    if parameters.min_symbol_size > parameters.max_symbol_size {
        return Err(JobError::InvalidParameters(format!(
            "minimum symbol size {} exceeds maximum {}",
            parameters.min_symbol_size, parameters.max_symbol_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::test_config;
    use crate::core::types::{BoundingBox, ContourMode, EnhancementPreset, ThresholdMethod};
    use crate::repository::SymbolRepository;
    use crate::services::page_store::{InMemoryPageStore, PageCache};
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use std::io::Cursor;
    use std::time::Duration;

    fn page_png(width: u32, height: u32, blobs: &[BoundingBox]) -> Vec<u8> {
        let img = GrayImage::from_fn(width, height, |x, y| {
            for b in blobs {
                if x >= b.x && x < b.right() && y >= b.y && y < b.bottom() {
                    return Luma([20u8]);
                }
            }
            Luma([235u8])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn params() -> ExtractionParameters {
        ExtractionParameters {
            threshold_method: ThresholdMethod::Simple,
            threshold_value: 128,
            min_symbol_size: 16,
            max_symbol_size: 64,
            ignore_margins: false,
            enhancement: EnhancementPreset::None,
            contour_mode: ContourMode::Simplified,
        }
    }

    struct Fixture {
        manager: JobManager,
        store: Arc<InMemoryPageStore>,
        repository: SymbolRepository,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(test_config())).await
    }

    async fn fixture_with(config: Arc<Config>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryPageStore::new());
        let cache = Arc::new(PageCache::new(
            Arc::clone(&store) as Arc<dyn PageStore>,
            8,
        ));
        let repository = SymbolRepository::new(dir.path().to_str().unwrap(), None)
            .await
            .unwrap();
        let metrics = Metrics::new();
        let pipeline = PagePipeline::new(
            Arc::clone(&config),
            cache,
            repository.clone(),
            metrics.clone(),
        );
        let manager = JobManager::new(config, pipeline, store.clone(), metrics);
        Fixture {
            manager,
            store,
            repository,
            _dir: dir,
        }
    }

    /// Register `count` pages that each contain one qualifying glyph.
    async fn seed_pages(store: &InMemoryPageStore, count: usize) -> Vec<PageId> {
        let mut ids = Vec::new();
        for i in 0..count {
            let folio = format!("{:02}r", i + 1);
            let page = store
                .register(
                    &folio,
                    None,
                    &format!("{folio}.png"),
                    page_png(100, 100, &[BoundingBox::new(30, 30, 20, 20)]),
                )
                .await
                .unwrap();
            ids.push(page.id);
        }
        ids
    }

    /// Poll until the job is terminal, the way external callers observe
    /// status per the polling contract.
    async fn poll_terminal(manager: &JobManager, job_id: JobId) -> ExtractionJob {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                let job = manager.get(job_id).unwrap();
                if job.status.is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("job did not reach a terminal state in time")
    }

    #[tokio::test]
    async fn test_scenario_three_qualifying_two_undersized() {
        let f = fixture().await;
        let page = f
            .store
            .register(
                "1r",
                None,
                "1r.png",
                page_png(
                    200,
                    120,
                    &[
                        BoundingBox::new(10, 10, 20, 20),
                        BoundingBox::new(60, 10, 30, 30),
                        BoundingBox::new(110, 10, 40, 40),
                        BoundingBox::new(10, 60, 5, 5),
                        BoundingBox::new(40, 60, 8, 8),
                    ],
                ),
            )
            .await
            .unwrap();

        let job = f.manager.start(page.id, page.id, params()).unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let finished = poll_terminal(&f.manager, job.id).await;
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.symbols_extracted, 3);
        assert_eq!(finished.progress, 100.0);
        assert!(finished.completed_at.is_some());
        assert_eq!(f.repository.for_page(page.id).len(), 3);
    }

    #[tokio::test]
    async fn test_mutual_exclusion_per_page() {
        let f = fixture().await;
        let ids = seed_pages(&f.store, 6).await;

        // Job A holds pages 1-5 (still queued: spawned task has not run).
        let a = f.manager.start(ids[0], ids[4], params()).unwrap();

        // Page 5 is held -> conflict.
        let conflict = f.manager.start(ids[4], ids[4], params());
        assert!(matches!(
            conflict,
            Err(JobError::PageBusy { page_id, job_id }) if page_id == ids[4] && job_id == a.id
        ));

        // Page 6 is free -> concurrent start succeeds.
        let b = f.manager.start(ids[5], ids[5], params()).unwrap();

        poll_terminal(&f.manager, a.id).await;
        poll_terminal(&f.manager, b.id).await;

        // Locks released: the conflicting range now starts cleanly.
        let retry = f.manager.start(ids[4], ids[4], params()).unwrap();
        poll_terminal(&f.manager, retry.id).await;
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let f = fixture().await;
        let ids = seed_pages(&f.store, 4).await;

        let mut rx = f.manager.subscribe();
        let job = f.manager.start(ids[0], ids[3], params()).unwrap();

        let mut last = 0.0f32;
        loop {
            let event = rx.recv().await.unwrap();
            if event.job_id != job.id {
                continue;
            }
            assert!(
                event.progress >= last,
                "progress went backwards: {} -> {}",
                last,
                event.progress
            );
            last = event.progress;
            if event.status.is_terminal() {
                assert_eq!(event.status, JobStatus::Completed);
                assert_eq!(event.progress, 100.0);
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_cancel_midway_keeps_processed_pages() {
        let f = fixture().await;
        // Full-size pages so per-page work is slow relative to the cancel
        // round-trip; the cancel always lands mid-range.
        let mut ids = Vec::new();
        for i in 0..6 {
            let folio = format!("{:02}r", i + 1);
            let page = f
                .store
                .register(
                    &folio,
                    None,
                    &format!("{folio}.png"),
                    page_png(400, 400, &[BoundingBox::new(100, 100, 40, 40)]),
                )
                .await
                .unwrap();
            ids.push(page.id);
        }

        let mut rx = f.manager.subscribe();
        let job = f.manager.start(ids[0], ids[5], params()).unwrap();

        // Cancel as soon as the first page has landed.
        loop {
            let event = rx.recv().await.unwrap();
            if event.job_id == job.id && event.progress > 0.0 {
                f.manager.cancel(job.id).unwrap();
                break;
            }
        }

        let finished = poll_terminal(&f.manager, job.id).await;
        assert_eq!(finished.status, JobStatus::Cancelled);
        assert!(finished.progress < 100.0);

        // Symbols for processed pages persist; nothing beyond was started.
        let processed = (finished.progress / 100.0 * ids.len() as f32).round() as usize;
        assert!(processed >= 1);
        for (i, page_id) in ids.iter().enumerate() {
            let symbols = f.repository.for_page(*page_id);
            if i < processed {
                assert!(!symbols.is_empty(), "page {} lost its symbols", page_id);
            } else {
                assert!(symbols.is_empty(), "page {} ran after cancel", page_id);
            }
        }

        // Pages are unlocked again.
        drop(rx);
        let retry = f.manager.start(ids[0], ids[5], params()).unwrap();
        poll_terminal(&f.manager, retry.id).await;
    }

    #[tokio::test]
    async fn test_cancel_queued_job_is_immediate() {
        let mut config = test_config();
        config.jobs.max_concurrent_jobs = 1;
        let f = fixture_with(Arc::new(config)).await;
        let ids = seed_pages(&f.store, 4).await;

        let a = f.manager.start(ids[0], ids[1], params()).unwrap();
        let b = f.manager.start(ids[2], ids[3], params()).unwrap();

        let cancelled = f.manager.cancel(b.id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert_eq!(cancelled.progress, 0.0);

        // B's pages are free immediately.
        let c = f.manager.start(ids[2], ids[3], params()).unwrap();

        poll_terminal(&f.manager, a.id).await;
        let c_finished = poll_terminal(&f.manager, c.id).await;
        assert_eq!(c_finished.status, JobStatus::Completed);

        // Cancelling a terminal job is a conflict.
        assert!(matches!(
            f.manager.cancel(b.id),
            Err(JobError::AlreadyTerminal { .. })
        ));
    }

    #[tokio::test]
    async fn test_validation_rejected_before_job_exists() {
        let f = fixture().await;
        let ids = seed_pages(&f.store, 1).await;

        let bad_sizes = f.manager.start(
            ids[0],
            ids[0],
            ExtractionParameters {
                min_symbol_size: 64,
                max_symbol_size: 16,
                ..params()
            },
        );
        assert!(matches!(bad_sizes, Err(JobError::InvalidParameters(_))));

        let inverted = f.manager.start(ids[0] + 5, ids[0], params());
        assert!(matches!(inverted, Err(JobError::InvalidPageRange { .. })));

        let empty = f.manager.start(900, 950, params());
        assert!(matches!(empty, Err(JobError::InvalidPageRange { .. })));

        assert!(f.manager.list().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_page_fails_job_keeps_earlier_pages() {
        /// Store whose second page exists but holds undecodable bytes:
        /// the page-scoped ImageRead path.
        struct BrokenStore {
            good: Vec<u8>,
        }
        impl PageStore for BrokenStore {
            fn get(&self, page_id: PageId) -> Option<crate::core::types::Page> {
                (page_id == 1 || page_id == 2).then(|| crate::core::types::Page {
                    id: page_id,
                    folio: format!("{page_id}r"),
                    width: 100,
                    height: 100,
                    section: None,
                    source: format!("{page_id}r.png"),
                })
            }
            fn image_bytes(&self, page_id: PageId) -> Option<Arc<Vec<u8>>> {
                match page_id {
                    1 => Some(Arc::new(self.good.clone())),
                    2 => Some(Arc::new(b"not an image at all".to_vec())),
                    _ => None,
                }
            }
            fn list(&self) -> Vec<crate::core::types::Page> {
                vec![self.get(1).unwrap(), self.get(2).unwrap()]
            }
            fn ids_in_range(&self, start: PageId, end: PageId) -> Vec<PageId> {
                (start..=end).filter(|id| *id == 1 || *id == 2).collect()
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn PageStore> = Arc::new(BrokenStore {
            good: page_png(100, 100, &[BoundingBox::new(30, 30, 20, 20)]),
        });
        let repository = SymbolRepository::new(dir.path().to_str().unwrap(), None)
            .await
            .unwrap();
        let metrics = Metrics::new();
        let config = Arc::new(test_config());
        let pipeline = PagePipeline::new(
            Arc::clone(&config),
            Arc::new(PageCache::new(Arc::clone(&store), 8)),
            repository.clone(),
            metrics.clone(),
        );
        let manager = JobManager::new(config, pipeline, store, metrics);

        let job = manager.start(1, 2, params()).unwrap();
        let finished = poll_terminal(&manager, job.id).await;
        assert_eq!(finished.status, JobStatus::Failed);
        let error = finished.error.expect("failed job records its error");
        assert!(error.contains("page 2"), "error should name the page: {error}");

        // Page 1's contribution is retained; no rollback across pages.
        assert!(!repository.for_page(1).is_empty());
        assert!(repository.for_page(2).is_empty());
    }

    #[tokio::test]
    async fn test_jobs_retained_newest_first() {
        let f = fixture().await;
        let ids = seed_pages(&f.store, 2).await;

        let a = f.manager.start(ids[0], ids[0], params()).unwrap();
        poll_terminal(&f.manager, a.id).await;
        let b = f.manager.start(ids[1], ids[1], params()).unwrap();
        poll_terminal(&f.manager, b.id).await;

        let jobs = f.manager.list();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, b.id);
        assert_eq!(jobs[1].id, a.id);
        assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
    }

    #[tokio::test]
    async fn test_get_unknown_job() {
        let f = fixture().await;
        assert!(matches!(
            f.manager.get(42),
            Err(JobError::JobNotFound(42))
        ));
    }
}

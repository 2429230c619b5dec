// Per-page extraction pipeline: preprocess -> detect -> filter -> features
// -> persist.
//
// CPU-heavy stages run under spawn_blocking so job execution never starves
// the async runtime. The stage observer lets the job manager mirror
// pipeline position into the job status without the pipeline knowing about
// jobs.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

use crate::core::config::Config;
use crate::core::errors::{PageContext, PipelineError, PipelineResult};
use crate::core::types::{ExtractionParameters, Page, PageId, Symbol, SymbolDraft};
use crate::repository::SymbolRepository;
use crate::services::detector::Detector;
use crate::services::page_store::PageCache;
use crate::services::preprocessor::Preprocessor;
use crate::services::region_filter::RegionFilter;
use crate::services::signature::signatures_for;
use crate::utils::Metrics;

/// Stage of per-page work currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Preprocessing,
    Detecting,
    FeatureExtraction,
    Classifying,
}

/// Stage observer callback. The no-op observer is `&|_| {}`.
pub type StageObserver<'a> = &'a (dyn Fn(PipelineStage) + Send + Sync);

pub struct PageOutcome {
    pub page_id: PageId,
    pub symbols: Vec<Symbol>,
}

pub struct PagePipeline {
    preprocessor: Arc<Preprocessor>,
    detector: Arc<Detector>,
    filter: Arc<RegionFilter>,
    pages: Arc<PageCache>,
    repository: SymbolRepository,
    metrics: Metrics,
    /// With no background save task, snapshots are written as part of the
    /// persist stage so repository failures surface on the owning job.
    save_immediately: bool,
}

impl PagePipeline {
    pub fn new(
        config: Arc<Config>,
        pages: Arc<PageCache>,
        repository: SymbolRepository,
        metrics: Metrics,
    ) -> Self {
        let save_immediately = config.save_interval_secs() == 0;
        Self {
            preprocessor: Arc::new(Preprocessor::new(Arc::clone(&config))),
            detector: Arc::new(Detector::new(Arc::clone(&config))),
            filter: Arc::new(RegionFilter::new(config)),
            pages,
            repository,
            metrics,
            save_immediately,
        }
    }

    /// Run the full pipeline for one page and atomically replace that
    /// page's symbols in the repository.
    #[instrument(skip(self, params, on_stage), fields(page_id = page.id, folio = %page.folio))]
    pub async fn execute(
        &self,
        page: &Page,
        params: &ExtractionParameters,
        on_stage: StageObserver<'_>,
    ) -> PipelineResult<PageOutcome> {
        let page_id = page.id;

        // Preprocess: decode (cached) + normalize.
        on_stage(PipelineStage::Preprocessing);
        let pre_start = Instant::now();
        let img = self.pages.decoded_image(page_id).await?;
        let preprocessor = Arc::clone(&self.preprocessor);
        let pre_params = params.clone();
        let prepared = tokio::task::spawn_blocking(move || {
            preprocessor.normalize(page_id, &img, &pre_params)
        })
        .await
        .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))?
        .on_page(page_id)?;
        self.metrics.record_preprocess_duration(pre_start.elapsed());

        // Detect + filter on the normalized buffer.
        on_stage(PipelineStage::Detecting);
        let detect_start = Instant::now();
        let detector = Arc::clone(&self.detector);
        let filter = Arc::clone(&self.filter);
        let detect_params = params.clone();
        let (normalized, outcome) = tokio::task::spawn_blocking(move || {
            let candidates = detector.detect(&prepared.image, &detect_params, page_id);
            let outcome = filter.apply(candidates, &detect_params, &prepared.mask, page_id);
            (prepared.image, outcome)
        })
        .await
        .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))?;
        self.metrics.record_detect_duration(detect_start.elapsed());

        // Feature extraction: similarity signatures per final box.
        on_stage(PipelineStage::FeatureExtraction);
        let feature_start = Instant::now();
        let boxes = outcome.boxes;
        let (boxes, signatures) = tokio::task::spawn_blocking(move || {
            let signatures = signatures_for(&normalized, &boxes);
            (boxes, signatures)
        })
        .await
        .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))?;
        self.metrics.record_feature_duration(feature_start.elapsed());

        debug_assert!(boxes
            .iter()
            .all(|b| b.contained_in(page.width, page.height)));

        // Persist: supersede the page's previous symbol set.
        on_stage(PipelineStage::Classifying);
        let persist_start = Instant::now();
        let drafts: Vec<SymbolDraft> = boxes
            .into_iter()
            .zip(signatures)
            .map(|(bounding_box, signature)| SymbolDraft {
                bounding_box,
                signature,
                metadata: Default::default(),
            })
            .collect();
        let symbols = self.repository.replace_page(page_id, drafts);
        if self.save_immediately {
            self.repository.save().await.on_page(page_id)?;
        }
        self.metrics.record_persist_duration(persist_start.elapsed());
        self.metrics.record_page_processed(symbols.len());

        debug!(
            page_id,
            symbols = symbols.len(),
            dropped_margin = outcome.dropped_margin,
            dropped_size = outcome.dropped_size,
            merged = outcome.merged,
            "page extraction complete"
        );

        Ok(PageOutcome { page_id, symbols })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::test_config;
    use crate::core::types::{BoundingBox, ThresholdMethod};
    use crate::services::page_store::{InMemoryPageStore, PageStore};
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

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

    fn scenario_params() -> ExtractionParameters {
        ExtractionParameters {
            threshold_method: ThresholdMethod::Simple,
            threshold_value: 128,
            min_symbol_size: 16,
            max_symbol_size: 64,
            ignore_margins: false,
            enhancement: crate::core::types::EnhancementPreset::None,
            contour_mode: crate::core::types::ContourMode::Simplified,
        }
    }

    async fn pipeline_fixture() -> (PagePipeline, Arc<InMemoryPageStore>, SymbolRepository, tempfile::TempDir)
    {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryPageStore::new());
        let cache = Arc::new(PageCache::new(
            Arc::clone(&store) as Arc<dyn PageStore>,
            8,
        ));
        let repository = SymbolRepository::new(dir.path().to_str().unwrap(), None)
            .await
            .unwrap();
        let pipeline = PagePipeline::new(
            Arc::new(test_config()),
            cache,
            repository.clone(),
            Metrics::new(),
        );
        (pipeline, store, repository, dir)
    }

    #[tokio::test]
    async fn test_qualifying_regions_only() {
        let (pipeline, store, _repo, _dir) = pipeline_fixture().await;

        // Three qualifying regions, two undersized ones.
        let blobs = [
            BoundingBox::new(10, 10, 20, 20),
            BoundingBox::new(60, 10, 30, 30),
            BoundingBox::new(110, 10, 40, 40),
            BoundingBox::new(10, 60, 5, 5),
            BoundingBox::new(40, 60, 8, 8),
        ];
        let page = store
            .register("1r", None, "1r.png", page_png(200, 120, &blobs))
            .await
            .unwrap();

        let outcome = pipeline
            .execute(&page, &scenario_params(), &|_| {})
            .await
            .unwrap();
        assert_eq!(outcome.symbols.len(), 3);
        assert!(outcome
            .symbols
            .iter()
            .all(|s| s.bounding_box.width >= 16 && s.bounding_box.width <= 64));
    }

    #[tokio::test]
    async fn test_reextraction_is_reproducible() {
        let (pipeline, store, repo, _dir) = pipeline_fixture().await;
        let blobs = [
            BoundingBox::new(10, 10, 20, 20),
            BoundingBox::new(60, 30, 24, 24),
        ];
        let page = store
            .register("2r", None, "2r.png", page_png(120, 80, &blobs))
            .await
            .unwrap();

        let first = pipeline
            .execute(&page, &scenario_params(), &|_| {})
            .await
            .unwrap();
        let second = pipeline
            .execute(&page, &scenario_params(), &|_| {})
            .await
            .unwrap();

        // Identical boxes and signatures, in the same order; the previous
        // set was superseded rather than duplicated.
        let boxes = |symbols: &[Symbol]| {
            symbols
                .iter()
                .map(|s| (s.bounding_box, s.signature.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(boxes(&first.symbols), boxes(&second.symbols));
        assert_eq!(repo.for_page(page.id).len(), 2);
    }

    #[tokio::test]
    async fn test_stage_order_observed() {
        let (pipeline, store, _repo, _dir) = pipeline_fixture().await;
        let page = store
            .register(
                "3r",
                None,
                "3r.png",
                page_png(100, 100, &[BoundingBox::new(20, 20, 20, 20)]),
            )
            .await
            .unwrap();

        let stages = std::sync::Mutex::new(Vec::new());
        pipeline
            .execute(&page, &scenario_params(), &|stage| {
                stages.lock().unwrap().push(stage);
            })
            .await
            .unwrap();

        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                PipelineStage::Preprocessing,
                PipelineStage::Detecting,
                PipelineStage::FeatureExtraction,
                PipelineStage::Classifying,
            ]
        );
    }

    #[tokio::test]
    async fn test_symbols_within_page_bounds() {
        let (pipeline, store, _repo, _dir) = pipeline_fixture().await;
        let blobs = [
            BoundingBox::new(0, 0, 30, 30),
            BoundingBox::new(70, 70, 30, 30),
        ];
        let page = store
            .register("4r", None, "4r.png", page_png(100, 100, &blobs))
            .await
            .unwrap();

        let outcome = pipeline
            .execute(&page, &scenario_params(), &|_| {})
            .await
            .unwrap();
        for s in &outcome.symbols {
            assert!(s.bounding_box.contained_in(page.width, page.height));
        }
    }
}

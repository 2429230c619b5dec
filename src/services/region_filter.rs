// Size/region filtering: margin exclusion, side-length bounds, fragment
// merging, and the canonical reading order.
//
// The output ordering (top-to-bottom, left-to-right; lower y wins, then
// lower x) is load-bearing: it fixes the order in which the repository
// assigns symbol identity, which keeps re-extractions reproducible.

use std::sync::Arc;
use tracing::debug;

use crate::core::config::Config;
use crate::core::types::{BoundingBox, ExtractionParameters, PageId};
use crate::services::preprocessor::MarginMask;

/// Result of a filter pass, with drop/merge accounting for job logs.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub boxes: Vec<BoundingBox>,
    pub dropped_margin: usize,
    pub dropped_size: usize,
    pub merged: usize,
}

pub struct RegionFilter {
    config: Arc<Config>,
}

impl RegionFilter {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Reduce raw candidates to the page's final box list.
    ///
    /// Steps, in order: drop boxes intersecting the excluded margin, drop
    /// boxes with a side outside [min, max], merge overlapping fragments to
    /// a fixed point, re-check merged boxes against the max side, then sort
    /// into reading order.
    pub fn apply(
        &self,
        candidates: Vec<BoundingBox>,
        params: &ExtractionParameters,
        mask: &MarginMask,
        page_id: PageId,
    ) -> FilterOutcome {
        let total = candidates.len();

        let in_bounds: Vec<BoundingBox> = candidates
            .into_iter()
            .filter(|b| !mask.excludes(b))
            .collect();
        let dropped_margin = total - in_bounds.len();

        let sized: Vec<BoundingBox> = in_bounds
            .into_iter()
            .filter(|b| side_in_range(b, params))
            .collect();
        let dropped_size_pre = total - dropped_margin - sized.len();

        let (mut boxes, merged) = merge_fragments(sized, self.config.overlap_merge_threshold());

        // A union of qualifying fragments can exceed the max side; those are
        // discarded rather than re-split.
        let before_recheck = boxes.len();
        boxes.retain(|b| b.width <= params.max_symbol_size && b.height <= params.max_symbol_size);
        let dropped_size = dropped_size_pre + (before_recheck - boxes.len());

        boxes.sort_by_key(|b| (b.y, b.x));

        debug!(
            page_id,
            total,
            kept = boxes.len(),
            dropped_margin,
            dropped_size,
            merged,
            "filtered candidate regions"
        );

        FilterOutcome {
            boxes,
            dropped_margin,
            dropped_size,
            merged,
        }
    }
}

fn side_in_range(b: &BoundingBox, params: &ExtractionParameters) -> bool {
    b.width >= params.min_symbol_size
        && b.height >= params.min_symbol_size
        && b.width <= params.max_symbol_size
        && b.height <= params.max_symbol_size
}

/// Merge boxes whose overlap ratio exceeds the threshold by taking the
/// union of their extents, repeating until a fixed point so chains of
/// fragments collapse into one box.
fn merge_fragments(mut boxes: Vec<BoundingBox>, threshold: f32) -> (Vec<BoundingBox>, usize) {
    let mut merged = 0;
    loop {
        let mut merged_this_round = false;
        'scan: for i in 0..boxes.len() {
            for j in (i + 1)..boxes.len() {
                if boxes[i].overlap_ratio(&boxes[j]) > threshold as f64 {
                    let union = boxes[i].union(&boxes[j]);
                    boxes[i] = union;
                    boxes.swap_remove(j);
                    merged += 1;
                    merged_this_round = true;
                    break 'scan;
                }
            }
        }
        if !merged_this_round {
            return (boxes, merged);
        }
    }
}

// Detector: binarization + connected-component contour extraction.
//
// Determinism is the load-bearing property here: identical image +
// identical parameters must yield an identical candidate set, since jobs
// must be re-runnable and idempotent-verifiable. Everything below is
// histogram/raster-scan based; no randomness anywhere.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::contrast::{adaptive_threshold, otsu_level, threshold, ThresholdType};
use imageproc::point::Point;
use std::sync::Arc;
use tracing::debug;

use crate::core::config::Config;
use crate::core::types::{BoundingBox, ContourMode, ExtractionParameters, PageId, ThresholdMethod};

pub struct Detector {
    config: Arc<Config>,
}

impl Detector {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Extract raw candidate bounding boxes from a normalized page image.
    ///
    /// Candidates come back in contour raster-scan order; the filter imposes
    /// the canonical reading order afterwards.
    pub fn detect(
        &self,
        image: &GrayImage,
        params: &ExtractionParameters,
        page_id: PageId,
    ) -> Vec<BoundingBox> {
        let binary = self.binarize(image, params);

        // Outer borders only: holes inside a glyph are part of the glyph,
        // not separate candidates.
        let contours: Vec<Contour<i32>> = find_contours(&binary);
        let candidates: Vec<BoundingBox> = contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .filter_map(|c| match params.contour_mode {
                ContourMode::Full => chain_bbox(&c.points),
                ContourMode::Simplified => chain_bbox(&simplify_chain(&c.points)),
            })
            .collect();

        debug!(
            page_id,
            method = ?params.threshold_method,
            contours = contours.len(),
            candidates = candidates.len(),
            "detection pass complete"
        );

        candidates
    }

    /// Binarize with ink as foreground (dark strokes on light parchment).
    fn binarize(&self, image: &GrayImage, params: &ExtractionParameters) -> GrayImage {
        match params.threshold_method {
            ThresholdMethod::Simple => {
                threshold(image, params.threshold_value, ThresholdType::BinaryInverted)
            }
            ThresholdMethod::Otsu => {
                let level = otsu_level(image);
                threshold(image, level, ThresholdType::BinaryInverted)
            }
            ThresholdMethod::Adaptive => {
                let mut binary = adaptive_threshold(image, self.config.adaptive_block_radius());
                image::imageops::invert(&mut binary);
                binary
            }
        }
    }
}

/// Bounding box of a border point chain. `None` for an empty chain.
fn chain_bbox(points: &[Point<i32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(BoundingBox::new(
        min_x as u32,
        min_y as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

/// Collapse collinear runs of border points, keeping direction changes.
/// Extents are unaffected, so both contour modes yield identical boxes.
fn simplify_chain(points: &[Point<i32>]) -> Vec<Point<i32>> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut simplified = vec![points[0]];
    for window in points.windows(3) {
        let (prev, cur, next) = (window[0], window[1], window[2]);
        let dir_in = (cur.x - prev.x, cur.y - prev.y);
        let dir_out = (next.x - cur.x, next.y - cur.y);
        if dir_in != dir_out {
            simplified.push(cur);
        }
    }
    simplified.push(points[points.len() - 1]);
    simplified
}

// Domain types for the symbol extraction workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use xxhash_rust::xxh3::xxh3_64;

pub type PageId = u64;
pub type JobId = u64;
pub type SymbolId = u64;

/// Page record as consumed from the upload/storage subsystem.
///
/// Pages are immutable after upload; this core never writes them back.
/// Image bytes live in the page store and are fetched separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    /// Folio label, e.g. "86r".
    pub folio: String,
    pub width: u32,
    pub height: u32,
    /// Manuscript section tag, when the upload subsystem provided one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Source image reference (filename or URI in the upload subsystem).
    pub source: String,
}

/// Axis-aligned bounding box in page pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        if x2 <= x1 || y2 <= y1 {
            return 0;
        }
        (x2 - x1) as u64 * (y2 - y1) as u64
    }

    /// Overlap ratio used for fragment merging: intersection area over the
    /// smaller box's area, so a box fully contained in another scores 1.0.
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f64 {
        let inter = self.intersection_area(other);
        if inter == 0 {
            return 0.0;
        }
        inter as f64 / self.area().min(other.area()) as f64
    }

    /// Union of extents of two boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        BoundingBox::new(x, y, right - x, bottom - y)
    }

    pub fn contained_in(&self, width: u32, height: u32) -> bool {
        self.right() <= width && self.bottom() <= height
    }
}

/// Binarization strategy applied before contour extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdMethod {
    /// Global threshold computed from the intensity histogram; the supplied
    /// threshold value is ignored (but still part of parameter identity).
    Otsu,
    /// Local mean threshold per neighborhood.
    Adaptive,
    /// The fixed supplied value.
    Simple,
}

/// Enhancement transform applied by the preprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnhancementPreset {
    None,
    Default,
    HighContrast,
}

/// Contour point-chain handling. Bounding boxes are identical under both
/// modes; the mode participates in parameter identity because the original
/// detection pipeline exposed it as a tunable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContourMode {
    /// Keep every border point.
    Full,
    /// Collapse collinear runs of border points.
    Simplified,
}

/// Extraction parameter set. Value object: no identity, compared by value
/// for idempotence checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionParameters {
    pub threshold_method: ThresholdMethod,
    pub threshold_value: u8,
    /// Minimum symbol side length in pixels.
    pub min_symbol_size: u32,
    /// Maximum symbol side length in pixels.
    pub max_symbol_size: u32,
    pub ignore_margins: bool,
    pub enhancement: EnhancementPreset,
    pub contour_mode: ContourMode,
}

impl Default for ExtractionParameters {
    fn default() -> Self {
        Self {
            threshold_method: ThresholdMethod::Otsu,
            threshold_value: 128,
            min_symbol_size: 16,
            max_symbol_size: 128,
            ignore_margins: true,
            enhancement: EnhancementPreset::Default,
            contour_mode: ContourMode::Simplified,
        }
    }
}

impl ExtractionParameters {
    /// Deterministic 64-bit fingerprint of the full parameter set, used in
    /// logs and job audit records. Equal fingerprints iff equal values.
    pub fn fingerprint(&self) -> u64 {
        let mut buf = Vec::with_capacity(16);
        buf.push(match self.threshold_method {
            ThresholdMethod::Otsu => 0u8,
            ThresholdMethod::Adaptive => 1,
            ThresholdMethod::Simple => 2,
        });
        buf.push(self.threshold_value);
        buf.extend_from_slice(&self.min_symbol_size.to_le_bytes());
        buf.extend_from_slice(&self.max_symbol_size.to_le_bytes());
        buf.push(self.ignore_margins as u8);
        buf.push(match self.enhancement {
            EnhancementPreset::None => 0u8,
            EnhancementPreset::Default => 1,
            EnhancementPreset::HighContrast => 2,
        });
        buf.push(match self.contour_mode {
            ContourMode::Full => 0u8,
            ContourMode::Simplified => 1,
        });
        xxh3_64(&buf)
    }
}

/// Extraction job lifecycle.
///
/// `Queued → Preprocessing → Detecting → FeatureExtraction → Classifying →
/// Completed`, with `Failed` reachable from any non-terminal state and
/// `Cancelled` reachable from any state prior to `Completed`. With a
/// multi-page range the in-progress states cycle once per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Preprocessing,
    Detecting,
    FeatureExtraction,
    Classifying,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            JobStatus::Preprocessing
                | JobStatus::Detecting
                | JobStatus::FeatureExtraction
                | JobStatus::Classifying
        )
    }

    /// Whether a transition to `to` is legal from this state.
    pub fn can_transition(&self, to: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            JobStatus::Queued => false,
            JobStatus::Failed => true,
            JobStatus::Cancelled => true,
            JobStatus::Completed => *self == JobStatus::Classifying,
            // In-progress states cycle per page, so any in-progress state
            // (or Queued) may move to any in-progress state.
            _ => true,
        }
    }
}

/// A unit of extraction work over a page range under one parameter set.
/// Mutated only by the job manager; retained after completion for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub id: JobId,
    pub start_page: PageId,
    pub end_page: PageId,
    pub parameters: ExtractionParameters,
    pub status: JobStatus,
    /// Pages fully processed / total pages, as a percentage. Never decreases.
    pub progress: f32,
    pub symbols_extracted: usize,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// First error recorded, when the job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// State transition notification published by the job manager.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f32,
    pub symbols_extracted: usize,
}

/// A located, sized and (optionally) categorized glyph/figure candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub page_id: PageId,
    pub bounding_box: BoundingBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Count of symbols manuscript-wide sharing this similarity signature.
    /// Derived from the signature index; recomputed on every read.
    pub frequency: usize,
    /// 64-bit perceptual grid hash, 16 lowercase hex chars.
    pub signature: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    pub extracted_at: DateTime<Utc>,
}

/// Candidate symbol produced by the pipeline, before the repository assigns
/// identity and derives frequency.
#[derive(Debug, Clone)]
pub struct SymbolDraft {
    pub bounding_box: BoundingBox,
    pub signature: u64,
    pub metadata: BTreeMap<String, String>,
}

/// Per-id outcome of a bulk categorization. A failed id never aborts the
/// batch; callers inspect each entry.
#[derive(Debug, Clone, Serialize)]
pub struct BulkCategorizeOutcome {
    pub symbol_id: SymbolId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Predicates for the query-then-act bulk flow: ids are resolved first,
/// then acted on, so the operation's effect is fixed at resolve time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SymbolFilter {
    pub page_start: Option<PageId>,
    pub page_end: Option<PageId>,
    /// Exact signature match, 16 hex chars.
    pub signature: Option<String>,
    /// Only symbols without a category.
    #[serde(default)]
    pub unclassified: bool,
}

/// Frequency report entry: one similarity-signature bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureCount {
    pub signature: String,
    pub count: usize,
}

/// Category distribution entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

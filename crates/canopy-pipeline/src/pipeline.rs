//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! [`crate::process`] runs everything in one call. [`Pipeline`] lets the
//! caller drive execution one step at a time:
//!
//! ```rust
//! # use canopy_pipeline::{Pipeline, PipelineConfig, PipelineError};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let result = Pipeline::new(png, PipelineConfig::default())
//!     .decode()?
//!     .crop()
//!     .segment()
//!     .compute_index()
//!     .composite()
//!     .summarize()
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state,
//! carrying forward what later stages still need. Frames that are
//! already decoded enter through [`Pipeline::from_image`].

use crate::diagnostics::StageMetrics;
use crate::roi::RoiRect;
use crate::segment::Segmentation;
use crate::types::{
    Dimensions, GrayImage, IndexMap, IndexStatistics, PipelineConfig, PipelineError,
    ProcessResult, RgbImage,
};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
#[must_use = "pipeline stages are consumed by advancing — call .decode() to continue"]
pub struct Pending {
    config: PipelineConfig,
    source: Vec<u8>,
}

impl Pending {
    /// The raw source image bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Validate the config, decode the source and advance to [`Decoded`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for an out-of-range
    /// config, [`PipelineError::EmptyInput`] for empty bytes,
    /// [`PipelineError::ImageDecode`] for unreadable data and
    /// [`PipelineError::EmptyImage`] for a zero-sized image.
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        self.config.validate()?;
        let original = crate::decode::decode(&self.source)?;
        Ok(Decoded {
            config: self.config,
            original,
            source_len: self.source.len(),
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state holding the full-frame RGB image.
#[must_use = "pipeline stages are consumed by advancing — call .crop() to continue"]
pub struct Decoded {
    config: PipelineConfig,
    original: RgbImage,
    source_len: usize,
}

impl Decoded {
    /// The full decoded frame.
    #[must_use]
    pub const fn original(&self) -> &RgbImage {
        &self.original
    }

    /// Crop the centered region of interest.
    pub fn crop(self) -> Cropped {
        let rect = crate::roi::roi_rect(Dimensions::of(&self.original), self.config.roi_margin);
        let cropped = crate::roi::crop(&self.original, self.config.roi_margin);
        log::trace!(
            "crop: {} -> {} (margin {:.3})",
            Dimensions::of(&self.original),
            rect.dimensions(),
            self.config.roi_margin,
        );
        Cropped {
            config: self.config,
            rect,
            cropped,
        }
    }
}

// ───────────────────────── Stage 2: Cropped ──────────────────────────

/// Pipeline state after cropping. Every later raster has these
/// dimensions.
#[must_use = "pipeline stages are consumed by advancing — call .segment() to continue"]
pub struct Cropped {
    config: PipelineConfig,
    rect: RoiRect,
    cropped: RgbImage,
}

impl Cropped {
    /// The analyzed region.
    #[must_use]
    pub const fn cropped(&self) -> &RgbImage {
        &self.cropped
    }

    /// Where the analyzed region sits in the full frame.
    #[must_use]
    pub const fn rect(&self) -> RoiRect {
        self.rect
    }

    /// Separate plant from background.
    pub fn segment(self) -> Segmented {
        let segmentation = crate::segment::segment(&self.cropped, &self.config.segmentation);
        Segmented {
            config: self.config,
            cropped: self.cropped,
            segmentation,
        }
    }
}

// ───────────────────────── Stage 3: Segmented ────────────────────────

/// Pipeline state holding the plant mask.
#[must_use = "pipeline stages are consumed by advancing — call .compute_index() to continue"]
pub struct Segmented {
    config: PipelineConfig,
    cropped: RgbImage,
    segmentation: Segmentation,
}

impl Segmented {
    /// Segmentation output including the bootstrap mask.
    #[must_use]
    pub const fn segmentation(&self) -> &Segmentation {
        &self.segmentation
    }

    /// The final plant mask.
    #[must_use]
    pub const fn mask(&self) -> &GrayImage {
        &self.segmentation.mask
    }

    /// Evaluate the configured vegetation index over the analyzed region.
    pub fn compute_index(self) -> Indexed {
        let index_map = crate::index::compute_index(&self.cropped, self.config.index);
        Indexed {
            config: self.config,
            cropped: self.cropped,
            segmentation: self.segmentation,
            index_map,
        }
    }
}

// ───────────────────────── Stage 4: Indexed ──────────────────────────

/// Pipeline state holding the raw index map.
#[must_use = "pipeline stages are consumed by advancing — call .composite() to continue"]
pub struct Indexed {
    config: PipelineConfig,
    cropped: RgbImage,
    segmentation: Segmentation,
    index_map: IndexMap,
}

impl Indexed {
    /// Raw, unclamped index values.
    #[must_use]
    pub const fn index_map(&self) -> &IndexMap {
        &self.index_map
    }

    /// Colorize the index and blend it onto the plant pixels.
    pub fn composite(self) -> Composited {
        let overlay = crate::visualize::overlay(
            &self.cropped,
            &self.index_map,
            &self.segmentation.mask,
            self.config.index,
            self.config.blackout_background,
        );
        Composited {
            config: self.config,
            segmentation: self.segmentation,
            index_map: self.index_map,
            overlay,
        }
    }
}

// ───────────────────────── Stage 5: Composited ───────────────────────

/// Pipeline state holding the visual overlay.
#[must_use = "pipeline stages are consumed by advancing — call .summarize() to continue"]
pub struct Composited {
    config: PipelineConfig,
    segmentation: Segmentation,
    index_map: IndexMap,
    overlay: RgbImage,
}

impl Composited {
    /// The composited overlay.
    #[must_use]
    pub const fn overlay(&self) -> &RgbImage {
        &self.overlay
    }

    /// Compute statistics of the raw index over the plant mask.
    pub fn summarize(self) -> Summarized {
        let statistics = crate::stats::compute_statistics(
            &self.index_map,
            &self.segmentation.mask,
            self.config.index,
            self.config.spad_calibration,
        );
        log::debug!(
            "{}: mean={:.4} std={:.4} cover={:.2}%",
            statistics.index,
            statistics.mean,
            statistics.std_dev,
            statistics.plant_area_percentage,
        );
        Summarized {
            segmentation: self.segmentation,
            overlay: self.overlay,
            statistics,
        }
    }
}

// ───────────────────────── Stage 6: Summarized ───────────────────────

/// Final pipeline state.
#[must_use = "call .into_result() to extract the ProcessResult"]
pub struct Summarized {
    segmentation: Segmentation,
    overlay: RgbImage,
    statistics: IndexStatistics,
}

impl Summarized {
    /// Scalar statistics.
    #[must_use]
    pub const fn statistics(&self) -> &IndexStatistics {
        &self.statistics
    }

    /// Consume the pipeline and return the [`ProcessResult`].
    #[must_use]
    pub fn into_result(self) -> ProcessResult {
        let dimensions = Dimensions::of(&self.overlay);
        ProcessResult {
            overlay: self.overlay,
            mask: self.segmentation.mask,
            statistics: self.statistics,
            dimensions,
            outcome: self.segmentation.outcome,
        }
    }
}

// ──────────────────────── PipelineStage trait ────────────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 7;

/// Name, position and diagnostics metrics shared by every stage that
/// has done work. [`Pending`] is stage `0` and has nothing to report.
pub trait PipelineStage {
    /// Human-readable name of this stage (e.g. `"decode"`, `"crop"`).
    const NAME: &str;

    /// Zero-based index of this stage (`1` for Decoded through `6` for
    /// Summarized).
    const INDEX: usize;

    /// Metrics describing the work done to reach this state.
    fn metrics(&self) -> StageMetrics;
}

impl PipelineStage for Decoded {
    const NAME: &str = "decode";
    const INDEX: usize = 1;

    fn metrics(&self) -> StageMetrics {
        let dimensions = Dimensions::of(&self.original);
        StageMetrics::Decode {
            input_bytes: self.source_len,
            width: dimensions.width,
            height: dimensions.height,
            pixel_count: dimensions.area(),
        }
    }
}

impl PipelineStage for Cropped {
    const NAME: &str = "crop";
    const INDEX: usize = 2;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Crop {
            margin: self.config.roi_margin,
            rect: self.rect,
        }
    }
}

impl PipelineStage for Segmented {
    const NAME: &str = "segment";
    const INDEX: usize = 3;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Segment {
            inverted: self.segmentation.inverted,
            bootstrap_coverage: crate::mask::coverage(&self.segmentation.bootstrap),
            plant_coverage: crate::mask::coverage(&self.segmentation.mask),
            outcome: self.segmentation.outcome,
        }
    }
}

impl PipelineStage for Indexed {
    const NAME: &str = "index";
    const INDEX: usize = 4;

    fn metrics(&self) -> StageMetrics {
        let (min, max) = self
            .index_map
            .pixels()
            .map(|p| p.0[0])
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        StageMetrics::Index {
            index: self.config.index,
            min,
            max,
        }
    }
}

impl PipelineStage for Composited {
    const NAME: &str = "composite";
    const INDEX: usize = 5;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Composite {
            blackout_background: self.config.blackout_background,
            plant_pixel_count: crate::mask::count_foreground(&self.segmentation.mask),
        }
    }
}

impl PipelineStage for Summarized {
    const NAME: &str = "statistics";
    const INDEX: usize = 6;

    fn metrics(&self) -> StageMetrics {
        StageMetrics::Statistics {
            mean: self.statistics.mean,
            std_dev: self.statistics.std_dev,
            plant_area_percentage: self.statistics.plant_area_percentage,
        }
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental vegetation analysis pipeline.
///
/// [`Pipeline::new`] stores encoded bytes without touching them;
/// [`Pipeline::from_image`] starts from an already-decoded frame.
pub struct Pipeline;

impl Pipeline {
    /// Start a pipeline from encoded image bytes.
    pub const fn new(source: Vec<u8>, config: PipelineConfig) -> Pending {
        Pending { config, source }
    }

    /// Start a pipeline from a decoded frame, skipping the decode stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for an out-of-range
    /// config and [`PipelineError::EmptyImage`] for a zero-sized frame.
    pub fn from_image(image: RgbImage, config: PipelineConfig) -> Result<Decoded, PipelineError> {
        config.validate()?;
        crate::decode::ensure_nonempty(&image)?;
        Ok(Decoded {
            config,
            original: image,
            source_len: 0,
        })
    }
}

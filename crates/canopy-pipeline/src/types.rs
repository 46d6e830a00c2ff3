//! Shared types for the canopy vegetation analysis pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference masks
/// without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can reference color
/// buffers without depending on `image` directly.
pub use image::RgbImage;

/// Single-channel floating-point raster holding one index value per pixel.
pub type IndexMap = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<I: image::GenericImageView>(image: &I) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Vegetation index formula applied per pixel.
///
/// The variant also selects the fixed normalization range used by the
/// visualization stage (see [`crate::visualize::IndexRange::for_index`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VegetationIndex {
    /// Excess Green: `2g - r - b`.
    #[default]
    ExG,
    /// Excess Green minus Excess Red: `ExG - (1.4r - g)`.
    ExGR,
    /// Visible Atmospherically Resistant Index: `(g - r) / (g + r - b)`.
    VARI,
    /// Normalized Green-Red Difference Index: `(g - r) / (g + r)`.
    NGRDI,
    /// Green Leaf Index: `(2g - r - b) / (2g + r + b)`.
    GLI,
    /// Triangular Greenness Index: `g - 0.39r - 0.61b`.
    TGI,
    /// Modified Green-Red Vegetation Index: `(g² - r²) / (g² + r²)`.
    MGRVI,
}

impl VegetationIndex {
    /// Every supported index, in presentation order.
    pub const ALL: [Self; 7] = [
        Self::ExG,
        Self::ExGR,
        Self::VARI,
        Self::NGRDI,
        Self::GLI,
        Self::TGI,
        Self::MGRVI,
    ];

    /// Short display name, e.g. `"ExG"`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ExG => "ExG",
            Self::ExGR => "ExGR",
            Self::VARI => "VARI",
            Self::NGRDI => "NGRDI",
            Self::GLI => "GLI",
            Self::TGI => "TGI",
            Self::MGRVI => "MGRVI",
        }
    }
}

impl fmt::Display for VegetationIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VegetationIndex {
    type Err = PipelineError;

    /// Parse an index name case-insensitively (`"exg"`, `"MGRVI"`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|index| index.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PipelineError::UnknownIndex(s.to_owned()))
    }
}

/// Tunables for the two-stage plant/background segmentation.
///
/// Defaults reproduce the field-tested behavior: a 200 px bootstrap
/// blob cutoff, a 300 px refined cutoff, a 3-of-4 corner vote and a
/// 5.0 minimum separation of the Lab `a` class means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Gaussian sigma for the bootstrap blur. Zero disables blurring.
    pub blur_sigma: f32,

    /// Connected components smaller than this (in pixels) are removed
    /// from the bootstrap mask.
    pub bootstrap_min_blob_area: u32,

    /// Connected components smaller than this (in pixels) are removed
    /// from the refined mask.
    pub refined_min_blob_area: u32,

    /// Number of foreground corners (out of 4) that triggers inversion
    /// of the bootstrap mask.
    pub corner_vote_threshold: u8,

    /// Minimum difference between plant and background Lab `a` means
    /// required to attempt refinement.
    pub min_class_separation: f64,

    /// Bootstrap coverage (fraction of pixels) below which refinement
    /// is skipped.
    pub min_coverage: f64,

    /// Bootstrap coverage (fraction of pixels) above which refinement
    /// is skipped.
    pub max_coverage: f64,
}

impl SegmentationConfig {
    /// Default bootstrap blur sigma: the sigma conventionally derived
    /// for a 5×5 Gaussian kernel, `0.3 × ((5 − 1) / 2 − 1) + 0.8`.
    ///
    /// `imageproc` sizes its kernel from sigma and clamps at the border,
    /// so the blur itself is not limited to a 5×5 window.
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.1;
    /// Default bootstrap blob cutoff in pixels.
    pub const DEFAULT_BOOTSTRAP_MIN_BLOB_AREA: u32 = 200;
    /// Default refined blob cutoff in pixels.
    pub const DEFAULT_REFINED_MIN_BLOB_AREA: u32 = 300;
    /// Default corner vote threshold.
    pub const DEFAULT_CORNER_VOTE_THRESHOLD: u8 = 3;
    /// Default minimum Lab `a` class separation.
    pub const DEFAULT_MIN_CLASS_SEPARATION: f64 = 5.0;
    /// Default lower coverage bound for refinement.
    pub const DEFAULT_MIN_COVERAGE: f64 = 0.01;
    /// Default upper coverage bound for refinement.
    pub const DEFAULT_MAX_COVERAGE: f64 = 0.99;
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            bootstrap_min_blob_area: Self::DEFAULT_BOOTSTRAP_MIN_BLOB_AREA,
            refined_min_blob_area: Self::DEFAULT_REFINED_MIN_BLOB_AREA,
            corner_vote_threshold: Self::DEFAULT_CORNER_VOTE_THRESHOLD,
            min_class_separation: Self::DEFAULT_MIN_CLASS_SEPARATION,
            min_coverage: Self::DEFAULT_MIN_COVERAGE,
            max_coverage: Self::DEFAULT_MAX_COVERAGE,
        }
    }
}

/// Linear calibration from mean index value to a SPAD chlorophyll
/// meter reading: `spad = slope * mean + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpadCalibration {
    /// Regression slope.
    pub slope: f64,
    /// Regression intercept.
    pub intercept: f64,
}

impl SpadCalibration {
    /// Beetroot profile, fitted against MGRVI means.
    pub const BEETROOT: Self = Self {
        slope: 220.69,
        intercept: 17.385,
    };

    /// Estimate a SPAD reading from a mean index value.
    ///
    /// Negative estimates are clamped to zero.
    #[must_use]
    pub fn estimate(self, mean: f64) -> f64 {
        self.slope.mul_add(mean, self.intercept).max(0.0)
    }
}

/// Configuration for the vegetation analysis pipeline.
///
/// All parameters have sensible defaults; call [`validate`](Self::validate)
/// (done automatically by the pipeline entry points) to reject
/// out-of-range values before any pixel work happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Which vegetation index to compute and visualize.
    pub index: VegetationIndex,

    /// Fraction of width/height removed from each edge before analysis.
    /// Must be in `[0.0, 0.5)`.
    pub roi_margin: f64,

    /// Segmentation tunables.
    pub segmentation: SegmentationConfig,

    /// Render background pixels black in the overlay instead of keeping
    /// the original image.
    pub blackout_background: bool,

    /// Optional SPAD calibration applied to the masked index mean.
    pub spad_calibration: Option<SpadCalibration>,
}

impl PipelineConfig {
    /// Default region-of-interest margin (10 % per edge).
    pub const DEFAULT_ROI_MARGIN: f64 = 0.1;

    /// Check every parameter against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// offending parameter.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let seg = &self.segmentation;
        if !(0.0..0.5).contains(&self.roi_margin) {
            return Err(PipelineError::InvalidConfig(format!(
                "roi_margin must be in [0.0, 0.5), got {}",
                self.roi_margin
            )));
        }
        if !seg.blur_sigma.is_finite() || seg.blur_sigma < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "blur_sigma must be finite and non-negative, got {}",
                seg.blur_sigma
            )));
        }
        if !(1..=4).contains(&seg.corner_vote_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "corner_vote_threshold must be in 1..=4, got {}",
                seg.corner_vote_threshold
            )));
        }
        if !seg.min_class_separation.is_finite() || seg.min_class_separation < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "min_class_separation must be finite and non-negative, got {}",
                seg.min_class_separation
            )));
        }
        if !(0.0..=1.0).contains(&seg.min_coverage)
            || !(0.0..=1.0).contains(&seg.max_coverage)
            || seg.min_coverage > seg.max_coverage
        {
            return Err(PipelineError::InvalidConfig(format!(
                "coverage bounds must satisfy 0 <= min <= max <= 1, got {}..{}",
                seg.min_coverage, seg.max_coverage
            )));
        }
        if let Some(cal) = self.spad_calibration
            && (!cal.slope.is_finite() || !cal.intercept.is_finite())
        {
            return Err(PipelineError::InvalidConfig(
                "spad_calibration slope and intercept must be finite".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index: VegetationIndex::default(),
            roi_margin: Self::DEFAULT_ROI_MARGIN,
            segmentation: SegmentationConfig::default(),
            blackout_background: false,
            spad_calibration: None,
        }
    }
}

/// How the segmentation engine arrived at its final mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SegmentationOutcome {
    /// The Lab refinement stage produced the mask.
    Refined {
        /// Absolute difference between plant and background `a` means.
        separation: f64,
        /// Threshold applied to the `a` channel.
        threshold: f64,
    },
    /// Bootstrap coverage was outside the refinement bounds; the
    /// bootstrap mask was returned unrefined.
    DegenerateCoverage {
        /// Bootstrap plant fraction in `[0, 1]`.
        coverage: f64,
    },
    /// The plant and background `a` means were too close; the
    /// bootstrap mask was returned unrefined.
    LowSeparation {
        /// Absolute difference between plant and background `a` means.
        separation: f64,
    },
}

impl SegmentationOutcome {
    /// Returns `true` if the refinement stage produced the mask.
    #[must_use]
    pub const fn is_refined(&self) -> bool {
        matches!(self, Self::Refined { .. })
    }
}

/// Summary statistics for one analyzed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    /// Index the statistics were computed for.
    pub index: VegetationIndex,
    /// Mean raw index value over plant pixels.
    pub mean: f64,
    /// Population standard deviation of raw index values over plant pixels.
    pub std_dev: f64,
    /// Plant pixels as a percentage of the analyzed area, in `[0, 100]`.
    pub plant_area_percentage: f64,
    /// SPAD estimate, present when a calibration was configured.
    pub spad_estimate: Option<f64>,
}

/// Result of running the full pipeline on one image.
///
/// Does not derive serde traits because the raster fields are plain
/// `image` buffers; see [`EncodedResult`] for the transportable form.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Colorized index overlay blended with the analyzed image.
    pub overlay: RgbImage,
    /// Final plant mask (255 = plant). Same dimensions as `overlay`.
    pub mask: GrayImage,
    /// Scalar statistics.
    pub statistics: IndexStatistics,
    /// Dimensions of the analyzed (cropped) region.
    pub dimensions: Dimensions,
    /// How the segmentation engine produced `mask`.
    pub outcome: SegmentationOutcome,
}

/// Encoded overlay bytes plus statistics, ready for transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedResult {
    /// Overlay image encoded in the requested format.
    pub bytes: Vec<u8>,
    /// Scalar statistics.
    pub statistics: IndexStatistics,
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The image decoded (or was supplied) with zero width or height.
    #[error("image has no pixels ({0})")]
    EmptyImage(Dimensions),

    /// Failed to encode an output image.
    #[error("failed to encode image: {0}")]
    ImageEncode(#[source] image::ImageError),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// An index name did not match any supported index.
    #[error("unknown vegetation index: {0:?}")]
    UnknownIndex(String),

    /// Two rasters that must share dimensions do not.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensions of the reference raster.
        expected: Dimensions,
        /// Dimensions of the offending raster.
        actual: Dimensions,
    },
}

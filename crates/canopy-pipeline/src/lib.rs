//! canopy-pipeline: vegetation index and plant segmentation (sans-IO).
//!
//! Turns an RGB photo of plants into a colorized index overlay plus
//! plant statistics through:
//! ROI crop -> segmentation -> vegetation index -> Turbo composite ->
//! masked statistics.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! byte slices and image buffers and returns structured data. File
//! handling and persistence live in the `canopy` binary and
//! `canopy-store`.

pub mod blur;
pub mod colormap;
pub mod decode;
pub mod diagnostics;
pub mod encode;
pub mod index;
pub mod mask;
pub mod pipeline;
pub mod roi;
pub mod segment;
pub mod stats;
pub mod types;
pub mod validation;
pub mod visualize;

pub use encode::{OutputFormat, encode};
pub use pipeline::Pipeline;
pub use types::{
    Dimensions, EncodedResult, GrayImage, IndexMap, IndexStatistics, PipelineConfig,
    PipelineError, ProcessResult, RgbImage, SegmentationConfig, SegmentationOutcome,
    SpadCalibration, VegetationIndex,
};
pub use validation::{MetricsSummary, SegmentationMetrics};
pub use visualize::generate_legend;

/// Run the full pipeline on encoded image bytes.
///
/// # Pipeline steps
///
/// 1. Validate `config`
/// 2. Decode to RGB
/// 3. Crop the centered region of interest
/// 4. Segment plant from background (ExG/Otsu bootstrap, Lab refinement)
/// 5. Compute the selected vegetation index
/// 6. Colorize and composite onto the plant pixels
/// 7. Masked statistics on the raw index values
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for an out-of-range config,
/// [`PipelineError::EmptyInput`] if `image_bytes` is empty,
/// [`PipelineError::ImageDecode`] if the image cannot be decoded and
/// [`PipelineError::EmptyImage`] if it has no pixels.
pub fn process(image_bytes: &[u8], config: &PipelineConfig) -> Result<ProcessResult, PipelineError> {
    let decoded = Pipeline::new(image_bytes.to_vec(), config.clone()).decode()?;
    Ok(run_from_decoded(decoded))
}

/// Run the full pipeline on an already-decoded frame.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for an out-of-range config
/// and [`PipelineError::EmptyImage`] if `image` has no pixels.
pub fn process_image(image: RgbImage, config: &PipelineConfig) -> Result<ProcessResult, PipelineError> {
    let decoded = Pipeline::from_image(image, config.clone())?;
    Ok(run_from_decoded(decoded))
}

/// Run the full pipeline and encode the overlay.
///
/// # Errors
///
/// Returns the errors of [`process`], plus
/// [`PipelineError::ImageEncode`] if the overlay cannot be encoded.
pub fn process_encoded(
    image_bytes: &[u8],
    config: &PipelineConfig,
    format: OutputFormat,
) -> Result<EncodedResult, PipelineError> {
    let result = process(image_bytes, config)?;
    Ok(EncodedResult {
        bytes: encode(&result.overlay, format)?,
        statistics: result.statistics,
    })
}

fn run_from_decoded(decoded: pipeline::Decoded) -> ProcessResult {
    decoded
        .crop()
        .segment()
        .compute_index()
        .composite()
        .summarize()
        .into_result()
}

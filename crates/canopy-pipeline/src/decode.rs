//! Image decoding into a 3-channel color buffer.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces an
//! `RgbImage`. Alpha is discarded; the vegetation indices only look at
//! the red, green and blue channels.

use crate::types::{Dimensions, PipelineError, RgbImage};

/// Decode raw image bytes into an RGB image.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
/// Returns [`PipelineError::EmptyImage`] if the decoded image has zero
/// width or height.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    ensure_nonempty(&rgb)?;
    Ok(rgb)
}

/// Reject images with no pixels.
///
/// Frames handed in by a capture source skip [`decode`], so the
/// pipeline calls this on every already-decoded image as well.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyImage`] if either axis is zero.
pub fn ensure_nonempty(image: &RgbImage) -> Result<(), PipelineError> {
    let dimensions = Dimensions::of(image);
    if dimensions.is_empty() {
        return Err(PipelineError::EmptyImage(dimensions));
    }
    Ok(())
}

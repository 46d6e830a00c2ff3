//! Centered region-of-interest cropping.
//!
//! Removes a fixed fraction of the width and height from every edge.
//! The result is a strictly smaller buffer, so every downstream stage
//! (mask, index map, statistics denominator) works on the analyzed
//! region only.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, RgbImage};

/// Pixel rectangle retained after removing the margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiRect {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width of the retained region.
    pub width: u32,
    /// Height of the retained region.
    pub height: u32,
}

impl RoiRect {
    /// Dimensions of the retained region.
    #[must_use]
    pub const fn dimensions(self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }
}

/// Compute the centered ROI for an image of the given size.
///
/// The per-axis margin is `floor(extent * margin)`. With `margin` in
/// `[0.0, 0.5)` (enforced by [`PipelineConfig::validate`]) the retained
/// region always has at least one pixel on each non-empty axis.
///
/// [`PipelineConfig::validate`]: crate::PipelineConfig::validate
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn roi_rect(dimensions: Dimensions, margin: f64) -> RoiRect {
    let margin = margin.clamp(0.0, 0.5);
    let margin_x = (f64::from(dimensions.width) * margin).floor() as u32;
    let margin_y = (f64::from(dimensions.height) * margin).floor() as u32;
    RoiRect {
        x: margin_x,
        y: margin_y,
        width: dimensions.width.saturating_sub(2 * margin_x),
        height: dimensions.height.saturating_sub(2 * margin_y),
    }
}

/// Crop the centered ROI out of `image`.
///
/// A zero margin returns a copy of the full image.
#[must_use = "returns the cropped image"]
pub fn crop(image: &RgbImage, margin: f64) -> RgbImage {
    let rect = roi_rect(Dimensions::of(image), margin);
    image::imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
}

//! Index visualization: fixed-range normalization, Turbo colorization,
//! plant-only compositing and the legend strip.
//!
//! Each index is mapped onto 8 bits with a fixed range rather than the
//! per-image min/max, so the same color means the same index value in
//! every capture.

use serde::{Deserialize, Serialize};

use crate::colormap;
use crate::types::{GrayImage, IndexMap, RgbImage, VegetationIndex};

/// Width of the legend strip in pixels.
pub const LEGEND_WIDTH: u32 = 512;

/// Height of the legend strip in pixels.
pub const LEGEND_HEIGHT: u32 = 30;

/// Weight of the colorized index when added onto plant pixels.
pub const OVERLAY_WEIGHT: f32 = 0.5;

/// Inclusive value range mapped onto `[0, 255]` for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexRange {
    /// Value mapped to 0.
    pub min: f32,
    /// Value mapped to 255.
    pub max: f32,
}

impl IndexRange {
    /// Display range used for `index`.
    ///
    /// ExG, ExGR and TGI can exceed 1 on saturated greens and use
    /// `[-1, 2]`; the ratio indices use `[-1, 1]`.
    #[must_use]
    pub const fn for_index(index: VegetationIndex) -> Self {
        match index {
            VegetationIndex::ExG | VegetationIndex::ExGR | VegetationIndex::TGI => Self {
                min: -1.0,
                max: 2.0,
            },
            VegetationIndex::VARI
            | VegetationIndex::NGRDI
            | VegetationIndex::GLI
            | VegetationIndex::MGRVI => Self {
                min: -1.0,
                max: 1.0,
            },
        }
    }

    /// Map `value` onto `[0, 255]`, saturating outside the range.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_byte(self, value: f32) -> u8 {
        let scaled = (value - self.min) * (255.0 / (self.max - self.min));
        scaled.round().clamp(0.0, 255.0) as u8
    }
}

/// Normalize an index map to 8 bits with the fixed range for `index`.
#[must_use = "returns the normalized map"]
pub fn normalize(map: &IndexMap, index: VegetationIndex) -> GrayImage {
    let range = IndexRange::for_index(index);
    GrayImage::from_fn(map.width(), map.height(), |x, y| {
        image::Luma([range.to_byte(map.get_pixel(x, y).0[0])])
    })
}

/// Apply the Turbo colormap to an 8-bit map.
#[must_use = "returns the colorized image"]
pub fn colorize(normalized: &GrayImage) -> RgbImage {
    let lut = colormap::turbo_lut();
    RgbImage::from_fn(normalized.width(), normalized.height(), |x, y| {
        lut[usize::from(normalized.get_pixel(x, y).0[0])]
    })
}

/// Blend `colored` onto `original` inside `mask`.
///
/// Plant pixels become `original + 0.5 * colored`, saturating at 255.
/// Background pixels keep the original color, or turn black when
/// `blackout_background` is set. All three rasters must share
/// dimensions.
#[must_use = "returns the composited image"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn composite(
    original: &RgbImage,
    colored: &RgbImage,
    mask: &GrayImage,
    blackout_background: bool,
) -> RgbImage {
    RgbImage::from_fn(original.width(), original.height(), |x, y| {
        let base = original.get_pixel(x, y);
        if mask.get_pixel(x, y).0[0] == 0 {
            return if blackout_background {
                image::Rgb([0, 0, 0])
            } else {
                *base
            };
        }
        let tint = colored.get_pixel(x, y);
        image::Rgb(std::array::from_fn(|c| {
            OVERLAY_WEIGHT
                .mul_add(f32::from(tint.0[c]), f32::from(base.0[c]))
                .round()
                .min(255.0) as u8
        }))
    })
}

/// Normalize, colorize and composite in one step.
#[must_use = "returns the overlay image"]
pub fn overlay(
    original: &RgbImage,
    map: &IndexMap,
    mask: &GrayImage,
    index: VegetationIndex,
    blackout_background: bool,
) -> RgbImage {
    let colored = colorize(&normalize(map, index));
    composite(original, &colored, mask, blackout_background)
}

/// Horizontal Turbo gradient, low values on the left.
///
/// Column `x` shows the color for 8-bit value `x * 256 / LEGEND_WIDTH`.
#[must_use]
pub fn generate_legend() -> RgbImage {
    let lut = colormap::turbo_lut();
    RgbImage::from_fn(LEGEND_WIDTH, LEGEND_HEIGHT, |x, _| {
        let value = (u64::from(x) * 256 / u64::from(LEGEND_WIDTH)).min(255);
        lut[usize::try_from(value).unwrap_or(255)]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_per_index() {
        assert_eq!(IndexRange::for_index(VegetationIndex::ExG).max, 2.0);
        assert_eq!(IndexRange::for_index(VegetationIndex::TGI).max, 2.0);
        assert_eq!(IndexRange::for_index(VegetationIndex::GLI).max, 1.0);
        for index in VegetationIndex::ALL {
            assert_eq!(IndexRange::for_index(index).min, -1.0);
        }
    }

    #[test]
    fn to_byte_maps_and_saturates() {
        let range = IndexRange::for_index(VegetationIndex::NGRDI);
        assert_eq!(range.to_byte(-1.0), 0);
        assert_eq!(range.to_byte(0.0), 128);
        assert_eq!(range.to_byte(1.0), 255);
        assert_eq!(range.to_byte(-5.0), 0);
        assert_eq!(range.to_byte(3.0), 255);
    }

    #[test]
    fn background_keeps_original_or_goes_black() {
        let original = RgbImage::from_pixel(2, 1, image::Rgb([10, 20, 30]));
        let colored = RgbImage::from_pixel(2, 1, image::Rgb([200, 200, 200]));
        let mask = GrayImage::from_fn(2, 1, |x, _| image::Luma([if x == 0 { 255 } else { 0 }]));

        let kept = composite(&original, &colored, &mask, false);
        assert_eq!(kept.get_pixel(1, 0).0, [10, 20, 30]);
        assert_eq!(kept.get_pixel(0, 0).0, [110, 120, 130]);

        let blacked = composite(&original, &colored, &mask, true);
        assert_eq!(blacked.get_pixel(1, 0).0, [0, 0, 0]);
        assert_eq!(blacked.get_pixel(0, 0).0, [110, 120, 130]);
    }

    #[test]
    fn plant_blend_saturates() {
        let original = RgbImage::from_pixel(1, 1, image::Rgb([250, 0, 200]));
        let colored = RgbImage::from_pixel(1, 1, image::Rgb([255, 10, 255]));
        let mask = GrayImage::from_pixel(1, 1, image::Luma([255]));
        assert_eq!(
            composite(&original, &colored, &mask, false).get_pixel(0, 0).0,
            [255, 5, 255]
        );
    }

    #[test]
    fn legend_shape_and_gradient() {
        let legend = generate_legend();
        assert_eq!(legend.dimensions(), (LEGEND_WIDTH, LEGEND_HEIGHT));
        assert_eq!(*legend.get_pixel(0, 0), colormap::turbo(0));
        assert_eq!(*legend.get_pixel(LEGEND_WIDTH - 1, 0), colormap::turbo(255));
        assert_eq!(*legend.get_pixel(256, 0), colormap::turbo(128));
        // Every row is identical.
        assert_eq!(legend.get_pixel(100, 0), legend.get_pixel(100, LEGEND_HEIGHT - 1));
    }

    #[test]
    fn overlay_preserves_dimensions() {
        let original = RgbImage::from_pixel(7, 5, image::Rgb([30, 160, 40]));
        let map = IndexMap::from_pixel(7, 5, image::Luma([0.8]));
        let mask = GrayImage::from_pixel(7, 5, image::Luma([255]));
        let out = overlay(&original, &map, &mask, VegetationIndex::ExG, false);
        assert_eq!(out.dimensions(), (7, 5));
    }
}

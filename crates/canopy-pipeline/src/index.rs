//! Per-pixel vegetation index computation.
//!
//! Every formula works on normalized chromatic coordinates
//!
//! ```text
//! r = R / (R + G + B + ε)    g = G / (R + G + B + ε)    b = B / (R + G + B + ε)
//! ```
//!
//! which makes the indices insensitive to overall brightness. The
//! output is a single-channel `f32` map with the same dimensions as the
//! input.
//!
//! Values are left unclamped (downstream normalization uses a fixed
//! range per index) with two exceptions: VARI is clamped to `[-1, 1]`,
//! and any non-finite result of any formula is replaced by `0.0`. A
//! division by exactly zero therefore yields zero rather than NaN/Inf.

use crate::types::{IndexMap, RgbImage, VegetationIndex};

/// Guard added to `R + G + B` before normalizing.
pub const CHROMATIC_EPSILON: f32 = 0.001;

/// Guard added to the VARI denominator `g + r - b`.
pub const VARI_EPSILON: f32 = 1e-7;

/// Guard added to the MGRVI denominator `g² + r²`.
pub const MGRVI_EPSILON: f32 = 0.001;

/// Normalized chromatic coordinates of one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chromatic {
    /// Red share.
    pub r: f32,
    /// Green share.
    pub g: f32,
    /// Blue share.
    pub b: f32,
}

impl Chromatic {
    /// Normalize an 8-bit `[R, G, B]` triple.
    #[must_use]
    pub fn from_rgb([red, green, blue]: [u8; 3]) -> Self {
        let (red, green, blue) = (f32::from(red), f32::from(green), f32::from(blue));
        let sum = red + green + blue + CHROMATIC_EPSILON;
        Self {
            r: red / sum,
            g: green / sum,
            b: blue / sum,
        }
    }
}

/// Evaluate one index formula on a single pixel.
#[must_use]
pub fn index_value(index: VegetationIndex, c: Chromatic) -> f32 {
    let Chromatic { r, g, b } = c;
    let value = match index {
        VegetationIndex::ExG => excess_green(c),
        VegetationIndex::ExGR => excess_green(c) - 1.4f32.mul_add(r, -g),
        VegetationIndex::VARI => {
            let value = finite_or_zero((g - r) / (g + r - b + VARI_EPSILON));
            value.clamp(-1.0, 1.0)
        }
        VegetationIndex::NGRDI => (g - r) / (g + r),
        VegetationIndex::GLI => excess_green(c) / (2.0f32.mul_add(g, r) + b),
        VegetationIndex::TGI => 0.61f32.mul_add(-b, 0.39f32.mul_add(-r, g)),
        VegetationIndex::MGRVI => {
            let (g2, r2) = (g * g, r * r);
            (g2 - r2) / (g2 + r2 + MGRVI_EPSILON)
        }
    };
    finite_or_zero(value)
}

/// Compute the index map for an entire image.
#[must_use = "returns the index map"]
pub fn compute_index(image: &RgbImage, index: VegetationIndex) -> IndexMap {
    IndexMap::from_fn(image.width(), image.height(), |x, y| {
        let c = Chromatic::from_rgb(image.get_pixel(x, y).0);
        image::Luma([index_value(index, c)])
    })
}

/// `2g - r - b`.
fn excess_green(Chromatic { r, g, b }: Chromatic) -> f32 {
    2.0f32.mul_add(g, -r) - b
}

/// Replace NaN and ±Inf with zero.
const fn finite_or_zero(value: f32) -> f32 {
    if value.is_finite() { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f32 = 1e-4;

    fn value(index: VegetationIndex, rgb: [u8; 3]) -> f32 {
        index_value(index, Chromatic::from_rgb(rgb))
    }

    #[test]
    fn chromatic_coordinates_sum_to_nearly_one() {
        let c = Chromatic::from_rgb([30, 120, 90]);
        assert!((c.r + c.g + c.b - 1.0).abs() < 1e-4);
    }

    #[test]
    fn black_pixel_does_not_divide_by_zero() {
        let c = Chromatic::from_rgb([0, 0, 0]);
        assert!(c.r.abs() < f32::EPSILON);
        for index in VegetationIndex::ALL {
            let v = value(index, [0, 0, 0]);
            assert!(v.is_finite(), "{index} produced {v} on black");
            assert!(v.abs() < TOL, "{index} produced {v} on black");
        }
    }

    #[test]
    fn exg_pure_green_is_near_two() {
        assert!((value(VegetationIndex::ExG, [0, 255, 0]) - 2.0).abs() < TOL);
    }

    #[test]
    fn exg_pure_red_is_near_minus_one() {
        assert!((value(VegetationIndex::ExG, [255, 0, 0]) + 1.0).abs() < TOL);
    }

    #[test]
    fn exg_gray_is_zero() {
        assert!(value(VegetationIndex::ExG, [90, 90, 90]).abs() < TOL);
    }

    #[test]
    fn exgr_gray_is_minus_excess_red() {
        // r = g = b = 1/3: ExG = 0, ExR = 1.4/3 - 1/3.
        let expected = -(1.4 / 3.0 - 1.0 / 3.0);
        assert!((value(VegetationIndex::ExGR, [90, 90, 90]) - expected).abs() < TOL);
    }

    #[test]
    fn vari_vanishing_denominator_is_finite_and_clamped() {
        // r = 0, g = b = 0.5 => g + r - b = 0.
        let v = value(VegetationIndex::VARI, [0, 100, 100]);
        assert!(v.is_finite());
        assert!((-1.0..=1.0).contains(&v));
    }

    #[test]
    fn vari_negative_denominator_is_clamped() {
        // Strong blue drives g + r - b negative.
        let v = value(VegetationIndex::VARI, [20, 40, 200]);
        assert!((-1.0..=1.0).contains(&v));
    }

    #[test]
    fn ngrdi_matches_formula() {
        let c = Chromatic::from_rgb([50, 150, 40]);
        let expected = (c.g - c.r) / (c.g + c.r);
        assert!((value(VegetationIndex::NGRDI, [50, 150, 40]) - expected).abs() < TOL);
    }

    #[test]
    fn gli_matches_formula() {
        let c = Chromatic::from_rgb([50, 150, 40]);
        let expected = (2.0 * c.g - c.r - c.b) / (2.0 * c.g + c.r + c.b);
        assert!((value(VegetationIndex::GLI, [50, 150, 40]) - expected).abs() < TOL);
    }

    #[test]
    fn tgi_matches_formula() {
        let c = Chromatic::from_rgb([50, 150, 40]);
        let expected = c.g - 0.39 * c.r - 0.61 * c.b;
        assert!((value(VegetationIndex::TGI, [50, 150, 40]) - expected).abs() < TOL);
    }

    #[test]
    fn mgrvi_pure_red_is_near_minus_one() {
        let v = value(VegetationIndex::MGRVI, [255, 0, 0]);
        assert!((v + 1.0).abs() < 0.01, "got {v}");
    }

    #[test]
    fn only_vari_is_clamped() {
        // ExG of pure green exceeds 1; it must not be clamped.
        assert!(value(VegetationIndex::ExG, [0, 255, 0]) > 1.0);
    }

    #[test]
    fn compute_index_preserves_dimensions() {
        let img = RgbImage::from_pixel(17, 9, image::Rgb([10, 200, 10]));
        let map = compute_index(&img, VegetationIndex::GLI);
        assert_eq!(map.dimensions(), (17, 9));
        assert!(map.pixels().all(|p| p.0[0].is_finite()));
    }
}

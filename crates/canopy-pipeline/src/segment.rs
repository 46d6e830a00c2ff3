//! Two-stage plant/background segmentation.
//!
//! **Bootstrap.** The image is blurred, ExG is computed and stretched to
//! `[0, 255]`, and Otsu's method picks a binary threshold. Plants are
//! rarely in all four corners of a capture, so when enough corners land
//! in the foreground the mask is inverted. Components smaller than
//! [`SegmentationConfig::bootstrap_min_blob_area`] are removed.
//!
//! **Refinement.** The bootstrap mask splits the Lab `a` (green–red)
//! channel into a plant class and a background class. A threshold is
//! placed between the two class distributions, one standard deviation
//! in from each mean, and applied in the direction that keeps the plant
//! side. Small components are removed again and the mask is closed with
//! a 5×5 ellipse.
//!
//! Refinement is skipped, and the bootstrap mask returned as is, when
//! the bootstrap coverage is outside
//! `[min_coverage, max_coverage]` or the class means are closer than
//! [`SegmentationConfig::min_class_separation`]. Neither case is an
//! error; the [`SegmentationOutcome`] records which path was taken.

use image::GrayImage;
use palette::{FromColor, Lab, Srgb};

use crate::mask::{self, FOREGROUND};
use crate::stats::MeanStd;
use crate::types::{IndexMap, RgbImage, SegmentationConfig, SegmentationOutcome, VegetationIndex};

/// Output of the segmentation engine.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Final plant mask (255 = plant).
    pub mask: GrayImage,
    /// Bootstrap mask after inversion and blob filtering.
    pub bootstrap: GrayImage,
    /// Whether the corner vote inverted the raw Otsu mask.
    pub inverted: bool,
    /// Which path produced `mask`.
    pub outcome: SegmentationOutcome,
}

/// Output of the bootstrap stage.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    /// Bootstrap mask after inversion and blob filtering.
    pub mask: GrayImage,
    /// Whether the corner vote inverted the raw Otsu mask.
    pub inverted: bool,
}

/// Segment `image` into plant and background.
///
/// The returned mask always has the dimensions of `image`.
#[must_use]
pub fn segment(image: &RgbImage, config: &SegmentationConfig) -> Segmentation {
    let Bootstrap {
        mask: bootstrap,
        inverted,
    } = bootstrap(image, config);
    let (mask, outcome) = refine(image, &bootstrap, config);
    Segmentation {
        mask,
        bootstrap,
        inverted,
        outcome,
    }
}

/// Stage 1: ExG + Otsu, corner-vote inversion, blob filtering.
#[must_use]
pub fn bootstrap(image: &RgbImage, config: &SegmentationConfig) -> Bootstrap {
    let raw = exg_otsu_mask(image, config.blur_sigma);
    let votes = mask::corner_votes(&raw);
    let inverted = votes >= config.corner_vote_threshold;
    let oriented = if inverted {
        log::debug!("bootstrap: {votes}/4 corners in foreground, inverting mask");
        mask::invert(&raw)
    } else {
        raw
    };
    Bootstrap {
        mask: mask::remove_small_blobs(&oriented, config.bootstrap_min_blob_area),
        inverted,
    }
}

/// Blur, compute ExG, stretch to 8 bits and apply Otsu's threshold.
///
/// This is the raw bootstrap mask before corner voting or blob
/// filtering: pixels strictly above the Otsu level are foreground.
#[must_use]
pub fn exg_otsu_mask(image: &RgbImage, blur_sigma: f32) -> GrayImage {
    let blurred = crate::blur::gaussian_blur_rgb(image, blur_sigma);
    let exg = crate::index::compute_index(&blurred, VegetationIndex::ExG);
    let stretched = stretch_to_u8(&exg);
    let level = imageproc::contrast::otsu_level(&stretched);
    threshold_above(&stretched, level)
}

/// Linearly map the map's `[min, max]` onto `[0, 255]`.
///
/// A flat map (no spread) maps to all zeros.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn stretch_to_u8(map: &IndexMap) -> GrayImage {
    let (min, max) = map
        .pixels()
        .map(|p| p.0[0])
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let spread = f64::from(max) - f64::from(min);
    let scale = if spread > f64::EPSILON {
        255.0 / spread
    } else {
        0.0
    };
    GrayImage::from_fn(map.width(), map.height(), |x, y| {
        let v = (f64::from(map.get_pixel(x, y).0[0]) - f64::from(min)) * scale;
        image::Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Binary threshold: `255` where the pixel is strictly above `level`.
#[must_use]
pub fn threshold_above(gray: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        image::Luma([if gray.get_pixel(x, y).0[0] > level {
            FOREGROUND
        } else {
            0
        }])
    })
}

/// CIE Lab `a*` (green–red axis) of every pixel, row-major.
///
/// Negative values are green, positive values red/magenta.
#[must_use]
pub fn lab_a_channel(image: &RgbImage) -> Vec<f32> {
    image
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            let srgb = Srgb::new(
                f32::from(r) / 255.0,
                f32::from(g) / 255.0,
                f32::from(b) / 255.0,
            );
            Lab::from_color(srgb).a
        })
        .collect()
}

/// Stage 2: Lab `a` refinement of a bootstrap mask.
///
/// Returns the bootstrap mask unchanged when refinement cannot improve
/// it, together with the reason.
#[must_use]
pub fn refine(
    image: &RgbImage,
    bootstrap: &GrayImage,
    config: &SegmentationConfig,
) -> (GrayImage, SegmentationOutcome) {
    let coverage = mask::coverage(bootstrap);
    if coverage < config.min_coverage || coverage > config.max_coverage {
        log::debug!(
            "refine: bootstrap coverage {:.2}% outside [{:.2}%, {:.2}%], keeping bootstrap mask",
            coverage * 100.0,
            config.min_coverage * 100.0,
            config.max_coverage * 100.0,
        );
        return (
            bootstrap.clone(),
            SegmentationOutcome::DegenerateCoverage { coverage },
        );
    }

    let a = lab_a_channel(image);
    let split = |want_plant: bool| {
        MeanStd::from_values(
            a.iter()
                .zip(bootstrap.as_raw())
                .filter(|&(_, &m)| (m > 0) == want_plant)
                .map(|(&v, _)| f64::from(v)),
        )
    };
    let plant = split(true);
    let background = split(false);

    if plant.count == 0 || background.count == 0 {
        return (
            bootstrap.clone(),
            SegmentationOutcome::DegenerateCoverage { coverage },
        );
    }

    let separation = (plant.mean - background.mean).abs();
    if separation < config.min_class_separation {
        log::debug!(
            "refine: Lab a separation {separation:.2} below {:.2}, keeping bootstrap mask",
            config.min_class_separation,
        );
        return (
            bootstrap.clone(),
            SegmentationOutcome::LowSeparation { separation },
        );
    }

    let plant_is_low = plant.mean < background.mean;
    let threshold = if plant_is_low {
        f64::midpoint(plant.mean + plant.std_dev, background.mean - background.std_dev)
    } else {
        f64::midpoint(plant.mean - plant.std_dev, background.mean + background.std_dev)
    };

    let (w, h) = image.dimensions();
    let thresholded = GrayImage::from_fn(w, h, |x, y| {
        let v = f64::from(a[(y as usize) * (w as usize) + x as usize]);
        let is_plant = if plant_is_low {
            v <= threshold
        } else {
            v > threshold
        };
        image::Luma([if is_plant { FOREGROUND } else { 0 }])
    });

    let filtered = mask::remove_small_blobs(&thresholded, config.refined_min_blob_area);
    let closed = mask::close(&filtered);

    log::debug!(
        "refine: plant a={:.2}±{:.2}, background a={:.2}±{:.2}, threshold {threshold:.2}",
        plant.mean,
        plant.std_dev,
        background.mean,
        background.std_dev,
    );

    (
        closed,
        SegmentationOutcome::Refined {
            separation,
            threshold,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREEN: image::Rgb<u8> = image::Rgb([30, 160, 40]);
    const SOIL: image::Rgb<u8> = image::Rgb([120, 90, 70]);

    /// A square of `inner` centered in a field of `outer`.
    fn centered_square(size: u32, side: u32, inner: image::Rgb<u8>, outer: image::Rgb<u8>) -> RgbImage {
        let lo = (size - side) / 2;
        RgbImage::from_fn(size, size, |x, y| {
            if (lo..lo + side).contains(&x) && (lo..lo + side).contains(&y) {
                inner
            } else {
                outer
            }
        })
    }

    #[test]
    fn stretch_maps_extremes_to_full_range() {
        let map = IndexMap::from_fn(3, 1, |x, _| image::Luma([x as f32 - 1.0]));
        let stretched = stretch_to_u8(&map);
        assert_eq!(stretched.as_raw(), &vec![0, 128, 255]);
    }

    #[test]
    fn stretch_flat_map_is_all_zero() {
        let map = IndexMap::from_pixel(4, 4, image::Luma([0.7]));
        assert!(stretch_to_u8(&map).pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn threshold_is_strict() {
        let gray = GrayImage::from_fn(3, 1, |x, _| image::Luma([[9, 10, 11][x as usize]]));
        assert_eq!(threshold_above(&gray, 10).as_raw(), &vec![0, 0, 255]);
    }

    #[test]
    fn lab_a_sign_separates_green_and_red() {
        let img = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgb([0, 200, 0])
            } else {
                image::Rgb([200, 0, 0])
            }
        });
        let a = lab_a_channel(&img);
        assert!(a[0] < -20.0, "green a = {}", a[0]);
        assert!(a[1] > 20.0, "red a = {}", a[1]);
    }

    #[test]
    fn plant_on_soil_is_foreground_without_inversion() {
        let img = centered_square(60, 30, GREEN, SOIL);
        let boot = bootstrap(&img, &SegmentationConfig::default());
        assert!(!boot.inverted);
        assert_eq!(boot.mask.get_pixel(30, 30).0[0], FOREGROUND);
        assert_eq!(boot.mask.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn green_corners_trigger_inversion() {
        // Green everywhere except a soil-colored center: raw Otsu marks
        // the corners as foreground, so the bootstrap must invert.
        let img = centered_square(60, 30, SOIL, GREEN);
        let config = SegmentationConfig::default();
        let raw = exg_otsu_mask(&img, config.blur_sigma);
        assert_eq!(mask::corner_votes(&raw), 4);

        let boot = bootstrap(&img, &config);
        assert!(boot.inverted);
        assert_eq!(mask::corner_votes(&boot.mask), 0);
        assert_eq!(boot.mask.get_pixel(30, 30).0[0], FOREGROUND);
    }

    #[test]
    fn flat_image_keeps_bootstrap_mask() {
        let img = RgbImage::from_pixel(40, 40, GREEN);
        let seg = segment(&img, &SegmentationConfig::default());
        assert!(matches!(
            seg.outcome,
            SegmentationOutcome::DegenerateCoverage { .. }
        ));
        assert_eq!(seg.mask, seg.bootstrap);
    }

    #[test]
    fn similar_hues_skip_refinement() {
        // Two greens with different ExG but nearly identical Lab a.
        let img = centered_square(60, 30, image::Rgb([40, 120, 40]), image::Rgb([60, 120, 60]));
        let config = SegmentationConfig {
            min_class_separation: 1000.0,
            ..SegmentationConfig::default()
        };
        let seg = segment(&img, &config);
        if !matches!(seg.outcome, SegmentationOutcome::DegenerateCoverage { .. }) {
            assert!(matches!(
                seg.outcome,
                SegmentationOutcome::LowSeparation { .. }
            ));
            assert_eq!(seg.mask, seg.bootstrap);
        }
    }

    #[test]
    fn refined_mask_covers_plant_square() {
        let img = centered_square(60, 30, GREEN, SOIL);
        let seg = segment(&img, &SegmentationConfig::default());
        assert!(seg.outcome.is_refined(), "outcome: {:?}", seg.outcome);
        assert_eq!(seg.mask.dimensions(), img.dimensions());
        assert_eq!(mask::count_foreground(&seg.mask), 900);
    }

    #[test]
    fn blob_cutoffs_apply_at_each_stage() {
        // 100 px speck, 256 px patch and a 900 px leaf on soil.
        let speck = |x: u32, y: u32| (10..20).contains(&x) && (90..100).contains(&y);
        let patch = |x: u32, y: u32| (90..106).contains(&x) && (10..26).contains(&y);
        let leaf = |x: u32, y: u32| (45..75).contains(&x) && (45..75).contains(&y);
        let img = RgbImage::from_fn(120, 120, |x, y| {
            if speck(x, y) || patch(x, y) || leaf(x, y) {
                GREEN
            } else {
                SOIL
            }
        });
        let count_in = |m: &GrayImage, region: &dyn Fn(u32, u32) -> bool| {
            m.enumerate_pixels()
                .filter(|&(x, y, p)| region(x, y) && p.0[0] == FOREGROUND)
                .count()
        };

        let seg = segment(&img, &SegmentationConfig::default());
        assert!(seg.outcome.is_refined(), "outcome: {:?}", seg.outcome);

        // Bootstrap (>= 200 px): speck dropped, patch kept.
        assert_eq!(count_in(&seg.bootstrap, &speck), 0);
        assert!(count_in(&seg.bootstrap, &patch) >= 200);
        assert!(count_in(&seg.bootstrap, &leaf) > 0);

        // Refinement (>= 300 px): patch dropped, leaf intact.
        assert_eq!(count_in(&seg.mask, &speck), 0);
        assert_eq!(count_in(&seg.mask, &patch), 0);
        assert_eq!(count_in(&seg.mask, &leaf), 900);
        assert_eq!(mask::count_foreground(&seg.mask), 900);
    }
}

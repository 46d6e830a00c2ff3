//! Masked statistics over an index map.

use crate::types::{GrayImage, IndexMap, IndexStatistics, SpadCalibration, VegetationIndex};

/// Mean and population standard deviation of a set of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanStd {
    /// Arithmetic mean (`0.0` when `count == 0`).
    pub mean: f64,
    /// Population standard deviation (`0.0` when `count == 0`).
    pub std_dev: f64,
    /// Number of samples.
    pub count: u64,
}

impl MeanStd {
    /// Accumulate sum and sum of squares in `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let (count, sum, sum_sq) = values
            .into_iter()
            .fold((0u64, 0.0f64, 0.0f64), |(n, s, sq), v| {
                (n + 1, s + v, v.mul_add(v, sq))
            });
        if count == 0 {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
                count,
            };
        }
        let n = count as f64;
        let mean = sum / n;
        let variance = mean.mul_add(-mean, sum_sq / n).max(0.0);
        Self {
            mean,
            std_dev: variance.sqrt(),
            count,
        }
    }
}

/// Mean and standard deviation of `map` over the nonzero pixels of `mask`.
///
/// `map` and `mask` must have the same dimensions; pixels beyond the
/// shorter buffer are ignored.
#[must_use]
pub fn masked_mean_std(map: &IndexMap, mask: &GrayImage) -> MeanStd {
    MeanStd::from_values(
        map.as_raw()
            .iter()
            .zip(mask.as_raw())
            .filter(|&(_, &m)| m > 0)
            .map(|(&v, _)| f64::from(v)),
    )
}

/// Foreground pixels as a percentage of the mask area.
///
/// Returns `0.0` for an empty mask, so the result is always in `[0, 100]`.
#[must_use]
pub fn plant_area_percentage(mask: &GrayImage) -> f64 {
    crate::mask::coverage(mask) * 100.0
}

/// Summarize `map` over the plant pixels of `mask`.
///
/// An empty mask yields zero mean and standard deviation. A SPAD
/// estimate is attached only when a calibration is provided.
#[must_use]
pub fn compute_statistics(
    map: &IndexMap,
    mask: &GrayImage,
    index: VegetationIndex,
    spad: Option<SpadCalibration>,
) -> IndexStatistics {
    let MeanStd { mean, std_dev, .. } = masked_mean_std(map, mask);
    IndexStatistics {
        index,
        mean,
        std_dev,
        plant_area_percentage: plant_area_percentage(mask),
        spad_estimate: spad.map(|calibration| calibration.estimate(mean)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn mean_std_of_known_values() {
        let s = MeanStd::from_values([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(s.count, 8);
        assert!((s.mean - 5.0).abs() < TOL);
        assert!((s.std_dev - 2.0).abs() < TOL);
    }

    #[test]
    fn mean_std_of_nothing_is_zero() {
        let s = MeanStd::from_values(std::iter::empty());
        assert_eq!(s.count, 0);
        assert!(s.mean.abs() < TOL);
        assert!(s.std_dev.abs() < TOL);
    }

    #[test]
    fn only_masked_pixels_contribute() {
        let map = IndexMap::from_fn(4, 1, |x, _| image::Luma([x as f32]));
        let mask = GrayImage::from_fn(4, 1, |x, _| image::Luma([if x >= 2 { 255 } else { 0 }]));
        let s = masked_mean_std(&map, &mask);
        assert_eq!(s.count, 2);
        assert!((s.mean - 2.5).abs() < TOL);
        assert!((s.std_dev - 0.5).abs() < TOL);
    }

    #[test]
    fn empty_mask_statistics() {
        let map = IndexMap::from_pixel(10, 10, image::Luma([0.4]));
        let mask = GrayImage::new(10, 10);
        let stats = compute_statistics(&map, &mask, VegetationIndex::GLI, None);
        assert!(stats.mean.abs() < TOL);
        assert!(stats.std_dev.abs() < TOL);
        assert!(stats.plant_area_percentage.abs() < TOL);
        assert!(stats.spad_estimate.is_none());
    }

    #[test]
    fn cover_percentage_uses_full_area() {
        let map = IndexMap::from_pixel(10, 10, image::Luma([0.5]));
        let mask = GrayImage::from_fn(10, 10, |_, y| image::Luma([if y < 3 { 255 } else { 0 }]));
        let stats = compute_statistics(&map, &mask, VegetationIndex::ExG, None);
        assert!((stats.plant_area_percentage - 30.0).abs() < TOL);
        assert!((stats.mean - 0.5).abs() < 1e-6);
    }

    #[test]
    fn spad_estimate_follows_calibration() {
        let map = IndexMap::from_pixel(2, 2, image::Luma([0.25]));
        let mask = GrayImage::from_pixel(2, 2, image::Luma([255]));
        let stats = compute_statistics(
            &map,
            &mask,
            VegetationIndex::ExG,
            Some(SpadCalibration::BEETROOT),
        );
        let expected = SpadCalibration::BEETROOT.slope * 0.25 + SpadCalibration::BEETROOT.intercept;
        assert!((stats.spad_estimate.unwrap() - expected).abs() < 1e-6);
    }
}

//! Segmentation quality against hand-labelled ground truth.
//!
//! Both masks are binarized at `> 127` before comparison, so anti-aliased
//! or JPEG-compressed ground truth still counts cleanly. Ratios whose
//! numerator has no true positives are reported as `0.0`.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, GrayImage, PipelineError, RgbImage};

/// Pixel values above this are foreground when comparing masks.
pub const BINARY_THRESHOLD: u8 = 127;

/// Confusion-matrix counts and derived scores for one mask pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentationMetrics {
    /// Plant in both masks.
    pub true_positive: u64,
    /// Plant in the prediction only.
    pub false_positive: u64,
    /// Plant in the ground truth only.
    pub false_negative: u64,
    /// Background in both masks.
    pub true_negative: u64,
    /// `TP / (TP + FP)`.
    pub precision: f64,
    /// `TP / (TP + FN)`.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// `(TP + TN) / total`.
    pub accuracy: f64,
    /// `TP / (TP + FP + FN)`.
    pub iou: f64,
}

impl SegmentationMetrics {
    /// Compare a predicted mask with a ground-truth mask.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if the masks differ
    /// in size.
    pub fn compare(ground_truth: &GrayImage, predicted: &GrayImage) -> Result<Self, PipelineError> {
        ensure_same_dimensions(ground_truth, predicted)?;

        let (mut tp, mut fp, mut fn_, mut tn) = (0u64, 0u64, 0u64, 0u64);
        for (&gt, &pred) in ground_truth.as_raw().iter().zip(predicted.as_raw()) {
            match (gt > BINARY_THRESHOLD, pred > BINARY_THRESHOLD) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => tn += 1,
            }
        }
        Ok(Self::from_counts(tp, fp, fn_, tn))
    }

    /// Derive the scores from raw confusion counts.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(
        true_positive: u64,
        false_positive: u64,
        false_negative: u64,
        true_negative: u64,
    ) -> Self {
        let ratio = |num: u64, den: u64| {
            if true_positive == 0 || den == 0 {
                0.0
            } else {
                num as f64 / den as f64
            }
        };
        let precision = ratio(true_positive, true_positive + false_positive);
        let recall = ratio(true_positive, true_positive + false_negative);
        let iou = ratio(true_positive, true_positive + false_positive + false_negative);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let total = true_positive + false_positive + false_negative + true_negative;
        let accuracy = if total == 0 {
            0.0
        } else {
            (true_positive + true_negative) as f64 / total as f64
        };
        Self {
            true_positive,
            false_positive,
            false_negative,
            true_negative,
            precision,
            recall,
            f1,
            accuracy,
            iou,
        }
    }
}

/// Mean scores over a batch of comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Number of comparisons averaged.
    pub count: usize,
    /// Mean precision.
    pub precision: f64,
    /// Mean recall.
    pub recall: f64,
    /// Mean F1.
    pub f1: f64,
    /// Mean accuracy.
    pub accuracy: f64,
    /// Mean IoU.
    pub iou: f64,
}

impl MetricsSummary {
    /// Average `metrics`; `None` when the slice is empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(metrics: &[SegmentationMetrics]) -> Option<Self> {
        if metrics.is_empty() {
            return None;
        }
        let n = metrics.len() as f64;
        let mean = |f: fn(&SegmentationMetrics) -> f64| metrics.iter().map(f).sum::<f64>() / n;
        Some(Self {
            count: metrics.len(),
            precision: mean(|m| m.precision),
            recall: mean(|m| m.recall),
            f1: mean(|m| m.f1),
            accuracy: mean(|m| m.accuracy),
            iou: mean(|m| m.iou),
        })
    }
}

/// Render a per-image CSV report with a trailing `AVERAGE` row.
#[must_use]
pub fn csv_report(rows: &[(String, SegmentationMetrics)]) -> String {
    let mut out = String::from("image,tp,fp,fn,tn,precision,recall,f1,accuracy,iou\n");
    for (name, m) in rows {
        let _ = writeln!(
            out,
            "{name},{},{},{},{},{:.4},{:.4},{:.4},{:.4},{:.4}",
            m.true_positive,
            m.false_positive,
            m.false_negative,
            m.true_negative,
            m.precision,
            m.recall,
            m.f1,
            m.accuracy,
            m.iou,
        );
    }
    let metrics: Vec<SegmentationMetrics> = rows.iter().map(|(_, m)| *m).collect();
    if let Some(avg) = MetricsSummary::average(&metrics) {
        let _ = writeln!(
            out,
            "AVERAGE,,,,,{:.4},{:.4},{:.4},{:.4},{:.4}",
            avg.precision, avg.recall, avg.f1, avg.accuracy, avg.iou,
        );
    }
    out
}

/// Color-coded agreement map over `original`.
///
/// True positives are painted green, false positives red and false
/// negatives blue. True negatives keep the original pixel.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if any of the three
/// rasters differs in size from `original`.
pub fn comparison_overlay(
    original: &RgbImage,
    ground_truth: &GrayImage,
    predicted: &GrayImage,
) -> Result<RgbImage, PipelineError> {
    let expected = Dimensions::of(original);
    for mask in [ground_truth, predicted] {
        let actual = Dimensions::of(mask);
        if actual != expected {
            return Err(PipelineError::DimensionMismatch { expected, actual });
        }
    }
    Ok(RgbImage::from_fn(expected.width, expected.height, |x, y| {
        let gt = ground_truth.get_pixel(x, y).0[0] > BINARY_THRESHOLD;
        let pred = predicted.get_pixel(x, y).0[0] > BINARY_THRESHOLD;
        match (gt, pred) {
            (true, true) => image::Rgb([0, 255, 0]),
            (false, true) => image::Rgb([255, 0, 0]),
            (true, false) => image::Rgb([0, 0, 255]),
            (false, false) => *original.get_pixel(x, y),
        }
    }))
}

fn ensure_same_dimensions(a: &GrayImage, b: &GrayImage) -> Result<(), PipelineError> {
    let expected = Dimensions::of(a);
    let actual = Dimensions::of(b);
    if expected == actual {
        Ok(())
    } else {
        Err(PipelineError::DimensionMismatch { expected, actual })
    }
}

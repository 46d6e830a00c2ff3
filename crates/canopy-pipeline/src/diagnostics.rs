//! Pipeline diagnostics: timing and per-stage metrics.
//!
//! [`process_with_diagnostics`] drives the incremental [`Pipeline`]
//! and records how long each stage took alongside what it produced.
//! Useful for tuning segmentation parameters and spotting slow stages.
//!
//! Timing goes through the [`Clock`] trait so callers choose the time
//! source; [`SystemClock`] uses the `web-time` crate, which maps to
//! `performance.now()` on WASM and `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`), since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{Pipeline, PipelineStage};
use crate::roi::RoiRect;
use crate::types::{PipelineConfig, PipelineError, ProcessResult, SegmentationOutcome, VegetationIndex};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of monotonic timestamps.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// Current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> Self::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: image decoding.
    pub decode: StageDiagnostics,
    /// Stage 2: ROI crop.
    pub crop: StageDiagnostics,
    /// Stage 3: two-stage segmentation.
    pub segment: StageDiagnostics,
    /// Stage 4: vegetation index computation.
    pub index: StageDiagnostics,
    /// Stage 5: colorization and compositing.
    pub composite: StageDiagnostics,
    /// Stage 6: masked statistics.
    pub statistics: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input image bytes (`0` for a pre-decoded frame).
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Total pixel count (`width * height`).
        pixel_count: u64,
    },
    /// ROI crop metrics.
    Crop {
        /// Margin fraction removed from each edge.
        margin: f64,
        /// Retained rectangle in full-frame coordinates.
        rect: RoiRect,
    },
    /// Segmentation metrics.
    Segment {
        /// Whether the corner vote inverted the bootstrap mask.
        inverted: bool,
        /// Plant fraction of the bootstrap mask.
        bootstrap_coverage: f64,
        /// Plant fraction of the final mask.
        plant_coverage: f64,
        /// Which path produced the final mask.
        outcome: SegmentationOutcome,
    },
    /// Index computation metrics.
    Index {
        /// Index evaluated.
        index: VegetationIndex,
        /// Smallest value in the map.
        min: f32,
        /// Largest value in the map.
        max: f32,
    },
    /// Compositing metrics.
    Composite {
        /// Whether background pixels were blacked out.
        blackout_background: bool,
        /// Pixels that received the index tint.
        plant_pixel_count: u64,
    },
    /// Statistics metrics.
    Statistics {
        /// Masked mean.
        mean: f64,
        /// Masked population standard deviation.
        std_dev: f64,
        /// Plant area as a percentage of the analyzed region.
        plant_area_percentage: f64,
    },
}

/// Run the full pipeline while timing every stage.
///
/// # Errors
///
/// Returns the same errors as [`crate::process`].
pub fn process_with_diagnostics<C: Clock>(
    bytes: &[u8],
    config: &PipelineConfig,
    clock: &C,
) -> Result<(ProcessResult, PipelineDiagnostics), PipelineError> {
    let total_start = clock.now();

    let start = clock.now();
    let decoded = Pipeline::new(bytes.to_vec(), config.clone()).decode()?;
    let decode = stage(clock, &start, &decoded);

    let start = clock.now();
    let cropped = decoded.crop();
    let crop = stage(clock, &start, &cropped);

    let start = clock.now();
    let segmented = cropped.segment();
    let segment = stage(clock, &start, &segmented);

    let start = clock.now();
    let indexed = segmented.compute_index();
    let index = stage(clock, &start, &indexed);

    let start = clock.now();
    let composited = indexed.composite();
    let composite = stage(clock, &start, &composited);

    let start = clock.now();
    let summarized = composited.summarize();
    let statistics = stage(clock, &start, &summarized);

    let result = summarized.into_result();
    let diagnostics = PipelineDiagnostics {
        decode,
        crop,
        segment,
        index,
        composite,
        statistics,
        total_duration: clock.elapsed(&total_start),
    };
    log::trace!("total {:.3}ms", duration_ms(diagnostics.total_duration));
    Ok((result, diagnostics))
}

/// Close out one stage's timing and collect its metrics.
fn stage<C: Clock, S: PipelineStage>(clock: &C, start: &C::Instant, state: &S) -> StageDiagnostics {
    let duration = clock.elapsed(start);
    log::trace!("{}: {:.3}ms", S::NAME, duration_ms(duration));
    StageDiagnostics {
        duration,
        metrics: state.metrics(),
    }
}

impl PipelineDiagnostics {
    /// Stages in execution order with display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 6] {
        [
            ("Decode", &self.decode),
            ("Crop", &self.crop),
            ("Segment", &self.segment),
            ("Index", &self.index),
            ("Composite", &self.composite),
            ("Statistics", &self.statistics),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        if let StageMetrics::Decode {
            width,
            height,
            pixel_count,
            ..
        } = &self.decode.metrics
        {
            lines.push(format!("Image: {width}x{height} ({pixel_count} pixels)"));
        }
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Crop { margin, rect } => format!(
            "margin={margin:.2} -> {}x{} at ({}, {})",
            rect.width, rect.height, rect.x, rect.y,
        ),
        StageMetrics::Segment {
            inverted,
            bootstrap_coverage,
            plant_coverage,
            outcome,
        } => {
            let path = match outcome {
                SegmentationOutcome::Refined { threshold, .. } => {
                    format!("refined a<>{threshold:.2}")
                }
                SegmentationOutcome::DegenerateCoverage { .. } => "degenerate coverage".to_owned(),
                SegmentationOutcome::LowSeparation { separation } => {
                    format!("low separation {separation:.2}")
                }
            };
            format!(
                "bootstrap={:.1}%{} final={:.1}% ({path})",
                bootstrap_coverage * 100.0,
                if *inverted { " inverted" } else { "" },
                plant_coverage * 100.0,
            )
        }
        StageMetrics::Index { index, min, max } => {
            format!("{index} range=[{min:.3}, {max:.3}]")
        }
        StageMetrics::Composite {
            blackout_background,
            plant_pixel_count,
        } => format!(
            "{plant_pixel_count} plant px{}",
            if *blackout_background {
                ", background blacked out"
            } else {
                ""
            },
        ),
        StageMetrics::Statistics {
            mean,
            std_dev,
            plant_area_percentage,
        } => format!("mean={mean:.4} std={std_dev:.4} cover={plant_area_percentage:.2}%"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Clock that advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                image::Rgb([30, 160, 40])
            } else {
                image::Rgb([120, 90, 70])
            }
        });
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        assert!((duration_ms(d) - 1234.0).abs() < 0.01);
    }

    #[test]
    fn every_stage_is_timed() {
        let clock = TickClock(Cell::new(0));
        let (result, diag) =
            process_with_diagnostics(&png(50, 40), &PipelineConfig::default(), &clock).unwrap();
        assert_eq!(result.dimensions.width, 40);
        for (name, stage) in diag.stages() {
            assert_eq!(stage.duration, Duration::from_millis(1), "stage {name}");
        }
        assert!(diag.total_duration > Duration::from_millis(6));
        assert!(matches!(
            diag.decode.metrics,
            StageMetrics::Decode {
                width: 50,
                height: 40,
                ..
            }
        ));
    }

    #[test]
    fn errors_propagate() {
        let result = process_with_diagnostics(&[], &PipelineConfig::default(), &SystemClock);
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn report_names_every_stage() {
        let (_, diag) =
            process_with_diagnostics(&png(30, 30), &PipelineConfig::default(), &SystemClock)
                .unwrap();
        let report = diag.report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        for name in ["Decode", "Crop", "Segment", "Index", "Composite", "Statistics"] {
            assert!(report.contains(name), "missing {name}");
        }
        assert!(report.contains("30x30"));
    }

    #[test]
    fn json_round_trip_keeps_durations() {
        let (_, diag) =
            process_with_diagnostics(&png(20, 20), &PipelineConfig::default(), &SystemClock)
                .unwrap();
        let json = serde_json::to_string(&diag).unwrap();
        let back: PipelineDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.crop.metrics, diag.crop.metrics);
        let drift = back.total_duration.abs_diff(diag.total_duration);
        assert!(drift < Duration::from_micros(1));
    }
}

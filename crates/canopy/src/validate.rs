//! `canopy validate`: score segmentation against hand-labelled masks.
//!
//! Every image in `--images` is paired with the ground-truth file in
//! `--ground-truth` that has the same file stem. Ground truth is
//! cropped with the same ROI as the image, so metrics cover exactly the
//! analyzed region.

use std::path::{Path, PathBuf};

use canopy_pipeline::validation::{self, MetricsSummary, SegmentationMetrics};
use canopy_pipeline::{Dimensions, GrayImage, PipelineConfig};

use crate::PipelineArgs;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(clap::Args)]
pub struct ValidateArgs {
    /// Directory of input images.
    #[arg(long)]
    images: PathBuf,

    /// Directory of ground-truth masks (white = plant), matched by file stem.
    #[arg(long)]
    ground_truth: PathBuf,

    /// Directory for TP/FP/FN comparison overlays (PNG).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write a per-image CSV report to this file.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Print per-image metrics and the summary as JSON.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(serde::Serialize)]
struct Report<'a> {
    images: Vec<ImageReport<'a>>,
    summary: Option<MetricsSummary>,
}

#[derive(serde::Serialize)]
struct ImageReport<'a> {
    image: &'a str,
    metrics: &'a SegmentationMetrics,
}

pub fn run(args: &ValidateArgs) -> Result<(), String> {
    let config = args.pipeline.config()?;
    let images = list_images(&args.images)?;
    if images.is_empty() {
        return Err(format!("No images found in {}", args.images.display()));
    }
    if let Some(ref dir) = args.output {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
    }

    let rows = score_batch(
        &images,
        &args.ground_truth,
        args.output.as_deref(),
        &config,
        !args.json,
    );

    let metrics: Vec<SegmentationMetrics> = rows.iter().map(|(_, m)| *m).collect();
    let summary = MetricsSummary::average(&metrics);

    if args.json {
        let report = Report {
            images: rows
                .iter()
                .map(|(image, metrics)| ImageReport { image, metrics })
                .collect(),
            summary,
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Error serializing report: {e}"))?;
        println!("{json}");
    } else if let Some(s) = summary {
        println!();
        println!("Summary ({} images)\n{}", s.count, "=".repeat(60));
        println!("Precision: {:.4}", s.precision);
        println!("Recall:    {:.4}", s.recall);
        println!("F1:        {:.4}", s.f1);
        println!("Accuracy:  {:.4}", s.accuracy);
        println!("IoU:       {:.4}", s.iou);
    }

    if let Some(ref path) = args.csv {
        std::fs::write(path, validation::csv_report(&rows))
            .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        log::info!("CSV report written to {}", path.display());
    }

    if rows.is_empty() {
        return Err("No image had a matching ground-truth mask".to_owned());
    }
    Ok(())
}

/// Score every image that has a ground-truth mask.
///
/// Images that cannot be read, processed or compared are logged and
/// skipped; the rest of the batch still runs.
fn score_batch(
    images: &[PathBuf],
    ground_truth_dir: &Path,
    output: Option<&Path>,
    config: &PipelineConfig,
    verbose: bool,
) -> Vec<(String, SegmentationMetrics)> {
    let mut rows = Vec::with_capacity(images.len());
    for image_path in images {
        let name = file_name(image_path);
        let Some(gt_path) = find_ground_truth(ground_truth_dir, image_path) else {
            log::warn!("{name}: no ground truth found, skipping");
            continue;
        };
        match score_image(image_path, &gt_path, output, config) {
            Ok(metrics) => {
                if verbose {
                    println!(
                        "{name}: IoU {:.3} | F1 {:.3} | precision {:.3} | recall {:.3}",
                        metrics.iou, metrics.f1, metrics.precision, metrics.recall,
                    );
                }
                rows.push((name, metrics));
            }
            Err(e) => log::warn!("{name}: {e}, skipping"),
        }
    }
    rows
}

/// Run the pipeline on one image and compare its mask with `gt_path`.
fn score_image(
    image_path: &Path,
    gt_path: &Path,
    output: Option<&Path>,
    config: &PipelineConfig,
) -> Result<SegmentationMetrics, String> {
    let original = image::open(image_path)
        .map_err(|e| format!("error reading {}: {e}", image_path.display()))?
        .to_rgb8();
    let ground_truth = image::open(gt_path)
        .map_err(|e| format!("error reading {}: {e}", gt_path.display()))?
        .to_luma8();

    let result =
        canopy_pipeline::process_image(original.clone(), config).map_err(|e| e.to_string())?;
    let ground_truth = crop_mask(&ground_truth, config.roi_margin);
    let metrics =
        SegmentationMetrics::compare(&ground_truth, &result.mask).map_err(|e| e.to_string())?;

    if let Some(dir) = output {
        let cropped = canopy_pipeline::roi::crop(&original, config.roi_margin);
        let overlay = validation::comparison_overlay(&cropped, &ground_truth, &result.mask)
            .map_err(|e| e.to_string())?;
        let stem = image_path
            .file_stem()
            .map_or_else(|| "image".into(), |s| s.to_string_lossy());
        let out = dir.join(format!("{stem}_comparison.png"));
        overlay
            .save_with_format(&out, image::ImageFormat::Png)
            .map_err(|e| format!("error writing {}: {e}", out.display()))?;
    }
    Ok(metrics)
}

/// Crop a ground-truth mask with the pipeline's ROI rule.
fn crop_mask(mask: &GrayImage, margin: f64) -> GrayImage {
    let rect = canopy_pipeline::roi::roi_rect(Dimensions::of(mask), margin);
    image::imageops::crop_imm(mask, rect.x, rect.y, rect.width, rect.height).to_image()
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| format!("Error reading {}: {e}", dir.display()))?;
    let mut images: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| has_image_extension(path))
        .collect();
    images.sort();
    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Ground-truth file in `dir` sharing `image`'s stem, any image extension.
fn find_ground_truth(dir: &Path, image: &Path) -> Option<PathBuf> {
    let stem = image.file_stem()?.to_string_lossy();
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|candidate| candidate.is_file())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

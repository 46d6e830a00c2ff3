//! canopy: command-line front end for vegetation index analysis.
//!
//! Runs the analysis pipeline on image files, writes overlays and the
//! color legend, scores segmentation against ground truth, and keeps
//! capture collections in a JSON store file.
//!
//! # Usage
//!
//! ```text
//! canopy process [OPTIONS] <IMAGE_PATH>
//! canopy legend --output legend.png
//! canopy validate --images <DIR> --ground-truth <DIR>
//! canopy collections --store <FILE> <COMMAND>
//! ```
//!
//! Set `RUST_LOG=debug` to see segmentation decisions.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod collections;
mod validate;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use canopy_pipeline::diagnostics::{PipelineDiagnostics, SystemClock};
use canopy_pipeline::{
    OutputFormat, PipelineConfig, SegmentationConfig, SpadCalibration, VegetationIndex,
};
use canopy_store::{NewSnapshot, SnapshotStore};
use clap::{Parser, Subcommand, ValueEnum};

/// Vegetation index and canopy cover analysis.
#[derive(Parser)]
#[command(name = "canopy", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one image: overlay, plant mask and statistics.
    Process(ProcessArgs),
    /// Write the color legend strip.
    Legend(LegendArgs),
    /// Score segmentation against hand-labelled masks.
    Validate(validate::ValidateArgs),
    /// Manage capture collections in a store file.
    Collections(collections::CollectionsArgs),
}

/// Pipeline parameters shared by `process` and `validate`.
#[derive(clap::Args)]
struct PipelineArgs {
    /// Vegetation index (ExG, ExGR, VARI, NGRDI, GLI, TGI, MGRVI).
    #[arg(long, default_value_t = VegetationIndex::default())]
    index: VegetationIndex,

    /// Fraction of width/height cropped from each edge (0.0-0.5).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_ROI_MARGIN)]
    roi_margin: f64,

    /// Gaussian sigma for the bootstrap blur.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_BLUR_SIGMA)]
    blur_sigma: f32,

    /// Minimum component area (px) kept in the bootstrap mask.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_BOOTSTRAP_MIN_BLOB_AREA)]
    bootstrap_min_blob_area: u32,

    /// Minimum component area (px) kept in the refined mask.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_REFINED_MIN_BLOB_AREA)]
    refined_min_blob_area: u32,

    /// Minimum Lab a separation between plant and background to refine.
    #[arg(long, default_value_t = SegmentationConfig::DEFAULT_MIN_CLASS_SEPARATION)]
    min_class_separation: f64,

    /// Render background pixels black in the overlay.
    #[arg(long)]
    blackout_background: bool,

    /// Attach a SPAD estimate using the beetroot calibration.
    #[arg(long)]
    spad: bool,

    /// Custom SPAD calibration slope (requires --spad-intercept).
    #[arg(long, requires = "spad_intercept")]
    spad_slope: Option<f64>,

    /// Custom SPAD calibration intercept (requires --spad-slope).
    #[arg(long, requires = "spad_slope")]
    spad_intercept: Option<f64>,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

impl PipelineArgs {
    /// Build a [`PipelineConfig`] from the flags.
    ///
    /// If `--config-json` is provided, the JSON is parsed directly and
    /// all individual parameter flags are ignored.
    fn config(&self) -> Result<PipelineConfig, String> {
        if let Some(ref json) = self.config_json {
            return serde_json::from_str(json)
                .map_err(|e| format!("Error parsing --config-json: {e}"));
        }

        let spad_calibration = match (self.spad_slope, self.spad_intercept) {
            (Some(slope), Some(intercept)) => Some(SpadCalibration { slope, intercept }),
            _ if self.spad => Some(SpadCalibration::BEETROOT),
            _ => None,
        };

        Ok(PipelineConfig {
            index: self.index,
            roi_margin: self.roi_margin,
            segmentation: SegmentationConfig {
                blur_sigma: self.blur_sigma,
                bootstrap_min_blob_area: self.bootstrap_min_blob_area,
                refined_min_blob_area: self.refined_min_blob_area,
                min_class_separation: self.min_class_separation,
                ..SegmentationConfig::default()
            },
            blackout_background: self.blackout_background,
            spad_calibration,
        })
    }
}

#[derive(clap::Args)]
struct ProcessArgs {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Write the overlay image to this file (extension from --format if none).
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Write the plant mask (PNG) to this file.
    #[arg(long)]
    mask_output: Option<PathBuf>,

    /// Encoding for --output.
    #[arg(long, value_enum, default_value_t = Format::Bmp)]
    format: Format,

    /// Print statistics (and diagnostics) as JSON.
    #[arg(long)]
    json: bool,

    /// Print per-stage timing diagnostics.
    #[arg(long)]
    diagnostics: bool,

    /// Number of runs for averaging diagnostics.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Store file to record the result in (requires --collection).
    #[arg(long, requires = "collection")]
    store: Option<PathBuf>,

    /// Collection name; created in the store if missing.
    #[arg(long, requires = "store")]
    collection: Option<String>,
}

#[derive(clap::Args)]
struct LegendArgs {
    /// Output file (extension from --format if none).
    #[arg(long, short)]
    output: PathBuf,

    /// Encoding for the legend image.
    #[arg(long, value_enum, default_value_t = Format::Png)]
    format: Format,
}

/// Output image encoding.
#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// Uncompressed BMP.
    Bmp,
    /// Lossless PNG.
    Png,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Bmp => Self::Bmp,
            Format::Png => Self::Png,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Process(args) => run_process(&args),
        Command::Legend(args) => run_legend(&args),
        Command::Validate(args) => validate::run(&args),
        Command::Collections(args) => collections::run(&args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn run_process(args: &ProcessArgs) -> Result<(), String> {
    let config = args.pipeline.config()?;
    let image_bytes = read_file(&args.image_path)?;

    log::info!(
        "{} ({} bytes), index {}",
        args.image_path.display(),
        image_bytes.len(),
        config.index,
    );

    let mut all_diagnostics = Vec::with_capacity(args.runs);
    let mut last = None;
    for run in 0..args.runs {
        let (result, diagnostics) = canopy_pipeline::diagnostics::process_with_diagnostics(
            &image_bytes,
            &config,
            &SystemClock,
        )
        .map_err(|e| format!("Pipeline error: {e}"))?;
        if args.diagnostics && args.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, args.runs);
        }
        if args.diagnostics && !args.json {
            println!("{}", diagnostics.report());
        }
        all_diagnostics.push(diagnostics);
        last = Some(result);
    }
    let result = last.ok_or("no pipeline runs were executed")?;

    if args.json {
        let value = if args.diagnostics {
            serde_json::json!({
                "statistics": result.statistics,
                "outcome": result.outcome,
                "diagnostics": all_diagnostics,
            })
        } else {
            serde_json::json!({
                "statistics": result.statistics,
                "outcome": result.outcome,
            })
        };
        let json = serde_json::to_string_pretty(&value)
            .map_err(|e| format!("Error serializing statistics: {e}"))?;
        println!("{json}");
    } else {
        print_statistics(&result.statistics, result.dimensions);
        if args.diagnostics && args.runs > 1 {
            print_multi_run_summary(&all_diagnostics);
        }
    }

    let output = args
        .output
        .as_deref()
        .map(|path| with_default_extension(path, args.format.into()));
    if let Some(ref path) = output {
        let bytes = canopy_pipeline::encode(&result.overlay, args.format.into())
            .map_err(|e| e.to_string())?;
        write_file(path, &bytes)?;
        log::info!("overlay written to {} ({} bytes)", path.display(), bytes.len());
    }

    if let Some(ref path) = args.mask_output {
        result
            .mask
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        log::info!("mask written to {}", path.display());
    }

    if let (Some(store_path), Some(name)) = (&args.store, &args.collection) {
        let mut store = collections::load_store(store_path)?;
        let set = match store.find_set(name) {
            Some(set) => set,
            None => store
                .create_set(name, None, canopy_store::now_ms())
                .map_err(|e| e.to_string())?,
        };
        let image_path = output
            .as_deref()
            .unwrap_or(args.image_path.as_path())
            .display()
            .to_string();
        let snapshot = store
            .save_snapshot(NewSnapshot {
                set_id: set.id,
                timestamp_ms: canopy_store::now_ms(),
                image_path,
                statistics: result.statistics,
            })
            .map_err(|e| e.to_string())?;
        collections::save_store(store_path, &store)?;
        log::info!("snapshot {} saved to collection {:?}", snapshot.id, set.name);
    }

    Ok(())
}

fn run_legend(args: &LegendArgs) -> Result<(), String> {
    let legend = canopy_pipeline::generate_legend();
    let format = OutputFormat::from(args.format);
    let path = with_default_extension(&args.output, format);
    let bytes = canopy_pipeline::encode(&legend, format).map_err(|e| e.to_string())?;
    write_file(&path, &bytes)?;
    eprintln!(
        "Legend written to {} ({}x{})",
        path.display(),
        legend.width(),
        legend.height(),
    );
    Ok(())
}

fn print_statistics(stats: &canopy_pipeline::IndexStatistics, dims: canopy_pipeline::Dimensions) {
    println!("Analyzed region: {dims}");
    println!("Index:           {}", stats.index);
    println!("Mean:            {:.4}", stats.mean);
    println!("Std dev:         {:.4}", stats.std_dev);
    println!("Plant cover:     {:.2}%", stats.plant_area_percentage);
    if let Some(spad) = stats.spad_estimate {
        println!("SPAD estimate:   {spad:.1}");
    }
}

/// Print aggregated timing across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();
    if durations.is_empty() {
        return;
    }

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;
    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_count = all_diagnostics[0].stages().len();
    for i in 0..stage_count {
        let name = all_diagnostics[0].stages()[i].0;
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| d.stages()[i].1.duration.as_secs_f64() * 1000.0)
            .sum();
        println!("{name:<24} {:>10.3}ms", total / all_diagnostics.len() as f64);
    }
}

/// `path`, with the format's extension appended when it has none.
fn with_default_extension(path: &Path, format: OutputFormat) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(format.extension())
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), String> {
    std::fs::write(path, bytes).map_err(|e| format!("Error writing {}: {e}", path.display()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_output_extension_follows_format() {
        assert_eq!(
            with_default_extension(Path::new("out/overlay"), OutputFormat::Bmp),
            PathBuf::from("out/overlay.bmp")
        );
        assert_eq!(
            with_default_extension(Path::new("legend"), OutputFormat::Png),
            PathBuf::from("legend.png")
        );
        assert_eq!(
            with_default_extension(Path::new("keep.jpeg"), OutputFormat::Png),
            PathBuf::from("keep.jpeg")
        );
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_build_config() {
        let cli = Cli::try_parse_from([
            "canopy",
            "process",
            "leaf.png",
            "--index",
            "mgrvi",
            "--roi-margin",
            "0.2",
            "--spad",
            "--blackout-background",
        ])
        .unwrap();
        let Command::Process(args) = cli.command else {
            unreachable!("parsed a process command");
        };
        let config = args.pipeline.config().unwrap();
        assert_eq!(config.index, VegetationIndex::MGRVI);
        assert!((config.roi_margin - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.spad_calibration, Some(SpadCalibration::BEETROOT));
        assert!(config.blackout_background);
        assert_eq!(config.segmentation, SegmentationConfig::default());
    }

    #[test]
    fn custom_spad_overrides_profile() {
        let cli = Cli::try_parse_from([
            "canopy",
            "process",
            "leaf.png",
            "--spad-slope",
            "100",
            "--spad-intercept",
            "2",
        ])
        .unwrap();
        let Command::Process(args) = cli.command else {
            unreachable!("parsed a process command");
        };
        let cal = args.pipeline.config().unwrap().spad_calibration.unwrap();
        assert!((cal.slope - 100.0).abs() < f64::EPSILON);
        assert!((cal.intercept - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn config_json_takes_precedence() {
        let cli = Cli::try_parse_from([
            "canopy",
            "process",
            "leaf.png",
            "--index",
            "vari",
            "--config-json",
            r#"{"index": "TGI", "roi_margin": 0.0}"#,
        ])
        .unwrap();
        let Command::Process(args) = cli.command else {
            unreachable!("parsed a process command");
        };
        let config = args.pipeline.config().unwrap();
        assert_eq!(config.index, VegetationIndex::TGI);
        assert!(config.roi_margin.abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_index_rejected() {
        assert!(Cli::try_parse_from(["canopy", "process", "x.png", "--index", "ndvi"]).is_err());
    }
}

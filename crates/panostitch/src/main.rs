//! panostitch: stitch a left/center/right photo triple into a panorama.
//!
//! Loads three overlapping images, optionally resizes them, stitches the
//! left image onto the center one and the right image onto that
//! composite, then writes the uncropped composite and the border-cropped
//! final panorama.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin panostitch -- [OPTIONS] <LEFT> <CENTER> <RIGHT>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use panostitch_pipeline::{
    BlendStrategy, CropStrategy, PanoramaDiagnostics, ResizeFilter, RgbImage, StitchConfig,
    Stitcher,
};

/// Longest side of the preview images written by `--preview-dir`.
const PREVIEW_MAX_SIDE: u32 = 800;

/// Stitch three overlapping photographs into one panorama.
#[derive(Parser)]
#[command(name = "panostitch", version)]
struct Cli {
    /// Left image (PNG, JPEG, BMP, WebP).
    left: PathBuf,

    /// Center image; the reference frame of the panorama.
    center: PathBuf,

    /// Right image.
    right: PathBuf,

    /// Resize all three inputs to this percentage before stitching.
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..=100))]
    scale_percent: Option<u32>,

    /// Resampling filter used by `--scale-percent`.
    #[arg(long, value_enum, default_value_t = Filter::Triangle)]
    resize_filter: Filter,

    /// Final (cropped) panorama output path.
    #[arg(long, short, default_value = "final_panorama.jpg")]
    output: PathBuf,

    /// Uncropped composite output path.
    #[arg(long, default_value = "panorama_uncropped.jpg")]
    uncropped: PathBuf,

    /// Border cropping strategy.
    #[arg(long, value_enum, default_value_t = Crop::LargestInterior)]
    crop: Crop,

    /// How overlapping pixels are merged.
    #[arg(long, value_enum, default_value_t = Blend::Max)]
    blend: Blend,

    /// Lowe ratio test factor.
    #[arg(long, default_value_t = StitchConfig::DEFAULT_RATIO)]
    ratio: f32,

    /// A stitch needs more than this many good matches.
    #[arg(long, default_value_t = StitchConfig::DEFAULT_MIN_MATCHES)]
    min_matches: usize,

    /// RANSAC reprojection threshold in pixels.
    #[arg(long, default_value_t = StitchConfig::DEFAULT_RANSAC_THRESHOLD)]
    ransac_threshold: f64,

    /// Refuse canvases larger than this many pixels.
    #[arg(long, default_value_t = StitchConfig::DEFAULT_MAX_CANVAS_PIXELS)]
    max_canvas_pixels: u64,

    /// Full stitch config as a JSON string.
    ///
    /// When provided, all other stitch parameter flags are ignored.
    /// Missing fields take their default values.
    #[arg(long)]
    config_json: Option<String>,

    /// Write downscaled PNG previews of both outputs into this directory.
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// Print a per-stage diagnostics report to stdout.
    #[arg(long)]
    report: bool,

    /// Print diagnostics as JSON instead of the human-readable report.
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Border cropping strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Crop {
    /// Keep the full canvas.
    None,
    /// Bounding box of the largest foreground region.
    BoundingBox,
    /// Iteratively shrink the bounding box (fast).
    Shrink,
    /// Largest all-foreground rectangle (best quality).
    LargestInterior,
}

/// Layer blending strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Blend {
    /// Per-channel maximum in the overlap.
    Max,
    /// Reference image wins in the overlap.
    PreferReference,
    /// Rounded mean in the overlap.
    Average,
}

/// Resize filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl From<Filter> for ResizeFilter {
    fn from(f: Filter) -> Self {
        match f {
            Filter::Nearest => Self::Nearest,
            Filter::Triangle => Self::Triangle,
            Filter::CatmullRom => Self::CatmullRom,
            Filter::Gaussian => Self::Gaussian,
            Filter::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// Build a [`StitchConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<StitchConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(StitchConfig {
        ratio: cli.ratio,
        min_matches: cli.min_matches,
        ransac_threshold: cli.ransac_threshold,
        max_canvas_pixels: cli.max_canvas_pixels,
        crop: match cli.crop {
            Crop::None => CropStrategy::None,
            Crop::BoundingBox => CropStrategy::BoundingBox,
            Crop::Shrink => CropStrategy::Shrink,
            Crop::LargestInterior => CropStrategy::LargestInterior,
        },
        blend: match cli.blend {
            Blend::Max => BlendStrategy::Max,
            Blend::PreferReference => BlendStrategy::PreferReference,
            Blend::Average => BlendStrategy::Average,
        },
        ..StitchConfig::default()
    })
}

/// Read and decode one input, applying the optional resize.
fn load(path: &Path, scale_percent: Option<u32>, filter: ResizeFilter) -> Result<RgbImage, String> {
    let bytes =
        std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    let image = panostitch_pipeline::decode(&bytes)
        .map_err(|e| format!("Error loading {}: {e}", path.display()))?;
    log::info!(
        "loaded {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(match scale_percent {
        Some(percent) => panostitch_pipeline::scale_percent(&image, percent, filter),
        None => image,
    })
}

fn save(image: &RgbImage, path: &Path) -> Result<(), String> {
    image
        .save(path)
        .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
    eprintln!(
        "Wrote {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(())
}

/// Write a preview no larger than [`PREVIEW_MAX_SIDE`] on its longest side.
fn save_preview(image: &RgbImage, dir: &Path, name: &str) -> Result<(), String> {
    let longest = image.width().max(image.height());
    let preview = if longest > PREVIEW_MAX_SIDE {
        let percent = (PREVIEW_MAX_SIDE * 100 / longest).max(1);
        panostitch_pipeline::scale_percent(image, percent, ResizeFilter::Triangle)
    } else {
        image.clone()
    };
    save(&preview, &dir.join(name))
}

fn print_diagnostics(diagnostics: &PanoramaDiagnostics, json: bool) -> Result<(), String> {
    if json {
        let text = serde_json::to_string_pretty(diagnostics)
            .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
        println!("{text}");
    } else {
        println!("{}", diagnostics.report());
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;
    log::debug!("config: {config:?}");

    let filter = ResizeFilter::from(cli.resize_filter);
    let left = load(&cli.left, cli.scale_percent, filter)?;
    let center = load(&cli.center, cli.scale_percent, filter)?;
    let right = load(&cli.right, cli.scale_percent, filter)?;

    let stitcher = Stitcher::new(config).map_err(|e| e.to_string())?;
    let (panorama, diagnostics) = stitcher
        .stitch_three_with_diagnostics(&left, &center, &right)
        .map_err(|e| format!("Stitching failed: {e}"))?;

    if diagnostics.crop.fell_back {
        eprintln!("Shrink crop was too aggressive; used the bounding box instead");
    }

    save(&panorama.uncropped, &cli.uncropped)?;
    save(&panorama.cropped, &cli.output)?;

    if let Some(ref dir) = cli.preview_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
        save_preview(&panorama.uncropped, dir, "preview_uncropped.png")?;
        save_preview(&panorama.cropped, dir, "preview_final.png")?;
    }

    if cli.report || cli.json {
        print_diagnostics(&diagnostics, cli.json)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

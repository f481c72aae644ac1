use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use image::{DynamicImage, RgbaImage};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use censor_core::{
    CensorError, Detector, EffectConfig, EffectKind, LazyDetector, Pipeline, Region,
    StaticDetector,
};

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "face-censor",
    version,
    about = "Detect faces in images and censor them",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Censor every face in one image.
    Censor {
        /// Input image path
        #[arg(short, long)]
        input: PathBuf,

        /// Output image path
        #[arg(short, long, default_value = "censored.png")]
        output: PathBuf,

        #[command(flatten)]
        effect: EffectArgs,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Detect and consolidate faces, then print or save the region report.
    Detect {
        /// Input image path
        #[arg(short, long)]
        input: PathBuf,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        effect: EffectArgs,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Censor many images one after another.
    Batch {
        /// Input image paths
        #[arg(short, long, required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,

        /// Directory for the censored images (same file names as the inputs)
        #[arg(long)]
        output_dir: PathBuf,

        #[command(flatten)]
        effect: EffectArgs,

        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Args)]
struct EffectArgs {
    /// Effect to apply (black-square, eye-bar, pixelated-eyes, pixelated-face,
    /// pixel-sort, pixelsort-eye-bar, blur-face, blur-eyes, wireframe, show-landmarks)
    #[arg(short, long)]
    effect: Option<EffectKind>,

    /// Pixelation block size in pixels (4–20)
    #[arg(long)]
    block_size: Option<u32>,

    /// Pixel-sort intensity in percent (10–100)
    #[arg(long)]
    intensity: Option<u32>,

    /// Minimum detection confidence (0.1–1.0)
    #[arg(long)]
    confidence: Option<f32>,

    /// Minimum face size in pixels (20–200)
    #[arg(long)]
    min_size: Option<u32>,

    /// Label printed by the overlay effects
    #[arg(long)]
    label: Option<String>,

    /// Seed for the pixel-sort random source
    #[arg(long)]
    seed: Option<u64>,

    /// JSON effect configuration; explicit flags override it
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct SourceArgs {
    /// Use regions from a JSON file (a list of regions or a `detect` report)
    #[arg(long, conflicts_with = "model")]
    regions: Option<PathBuf>,

    /// SeetaFace model file for the built-in detector
    #[arg(long)]
    model: Option<PathBuf>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Respect RUST_LOG; default to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Censor {
            input,
            output,
            effect,
            source,
        } => cmd_censor(input, output, effect, source).await,
        Commands::Detect {
            input,
            report,
            effect,
            source,
        } => cmd_detect(input, report, effect, source).await,
        Commands::Batch {
            inputs,
            output_dir,
            effect,
            source,
        } => cmd_batch(inputs, output_dir, effect, source).await,
    }
}

// ── censor ────────────────────────────────────────────────────────────────────

async fn cmd_censor(
    input: PathBuf,
    output: PathBuf,
    effect: EffectArgs,
    source: SourceArgs,
) -> Result<()> {
    let config = effect.resolve()?;
    info!("Censoring faces");
    info!("  input  : {}", input.display());
    info!("  output : {}", output.display());
    info!("  effect : {}", config.kind);

    let mut pipeline = Pipeline::new(Backend::from_args(&source)?, config)?;
    let image = load_image(&input)?;

    let pb = spinner("Detecting and censoring…");
    let processed = pipeline.process(image).await;
    pb.finish_and_clear();

    if processed.consolidation.synthetic {
        warn!("detector unavailable; synthetic regions were censored");
    }
    info!(
        regions = processed.regions().len(),
        applied = processed.summary.applied,
        skipped = processed.summary.skipped,
        "done"
    );
    save_image(processed.image, &output)?;
    pipeline.detector_mut().dispose();
    Ok(())
}

// ── detect ────────────────────────────────────────────────────────────────────

async fn cmd_detect(
    input: PathBuf,
    report: Option<PathBuf>,
    effect: EffectArgs,
    source: SourceArgs,
) -> Result<()> {
    let config = effect.resolve()?;
    let pipeline = Pipeline::new(Backend::from_args(&source)?, config)?;
    let image = load_image(&input)?;

    let pb = spinner("Detecting faces…");
    let consolidation = pipeline.detect(&image).await;
    pb.finish_and_clear();

    info!(
        regions = consolidation.regions.len(),
        synthetic = consolidation.synthetic,
        downscaled = consolidation.used_downscaled,
        tiles = consolidation.tiles_scanned,
        "detection finished"
    );

    let json =
        serde_json::to_string_pretty(&consolidation).context("failed to serialise report")?;
    match report {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("failed to write report: {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

// ── batch ─────────────────────────────────────────────────────────────────────

async fn cmd_batch(
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    effect: EffectArgs,
    source: SourceArgs,
) -> Result<()> {
    let config = effect.resolve()?;
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    info!("Batch censoring {} images with {}", inputs.len(), config.kind);

    let mut pipeline = Pipeline::new(Backend::from_args(&source)?, config)?;
    let pb = progress(inputs.len() as u64);
    let mut failed = 0usize;

    // Strictly sequential: each image owns its buffer for the whole run.
    for input in &inputs {
        pb.set_message(input.display().to_string());
        let result = async {
            let name = input
                .file_name()
                .with_context(|| format!("not a file: {}", input.display()))?;
            let image = load_image(input)?;
            let processed = pipeline.process(image).await;
            save_image(processed.image, &output_dir.join(name))
        }
        .await;
        if let Err(e) = result {
            failed += 1;
            pb.suspend(|| warn!("skipping {}: {e:#}", input.display()));
        }
        pb.inc(1);
    }
    pb.finish_with_message("Done.");
    pipeline.detector_mut().dispose();

    if failed > 0 {
        bail!("{failed} of {} images failed", inputs.len());
    }
    Ok(())
}

// ── Configuration ─────────────────────────────────────────────────────────────

impl EffectArgs {
    /// Config file (or defaults) first, then explicit flags on top.
    fn resolve(&self) -> Result<EffectConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config: {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid config: {}", path.display()))?
            }
            None => EffectConfig::default(),
        };
        if let Some(kind) = self.effect {
            config.kind = kind;
        }
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(intensity) = self.intensity {
            config.sort_intensity = intensity;
        }
        if let Some(confidence) = self.confidence {
            config.confidence_threshold = confidence;
        }
        if let Some(min_size) = self.min_size {
            config.min_region_size = min_size;
        }
        if let Some(label) = &self.label {
            config.label = Some(label.clone());
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Region files are either a bare list or a `detect` report.
#[derive(Deserialize)]
#[serde(untagged)]
enum RegionsFile {
    List(Vec<Region>),
    Report { regions: Vec<Region> },
}

// ── Detector backends ─────────────────────────────────────────────────────────

enum Backend {
    Static(StaticDetector),
    #[cfg(feature = "rustface")]
    Seeta(LazyDetector<censor_core::RustfaceDetector>),
    Unavailable(LazyDetector<StaticDetector>),
}

impl Backend {
    fn from_args(source: &SourceArgs) -> Result<Self> {
        if let Some(path) = &source.regions {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read regions: {}", path.display()))?;
            let regions = match serde_json::from_str(&text)
                .with_context(|| format!("invalid regions file: {}", path.display()))?
            {
                RegionsFile::List(regions) | RegionsFile::Report { regions } => regions,
            };
            info!("using {} regions from {}", regions.len(), path.display());
            return Ok(Backend::Static(StaticDetector::new(regions)));
        }

        #[cfg(feature = "rustface")]
        {
            if let Some(path) = source.model.clone() {
                return Ok(Backend::Seeta(LazyDetector::new(move || {
                    censor_core::RustfaceDetector::from_path(&path)
                })));
            }
        }

        let reason = match &source.model {
            Some(_) => "this build has no detector backend (enable the `rustface` feature)",
            None => "no --model or --regions given",
        };
        Ok(Backend::Unavailable(LazyDetector::new(move || {
            Err(CensorError::DetectionUnavailable(reason.to_string()))
        })))
    }

    fn dispose(&mut self) {
        match self {
            Backend::Static(_) => {}
            #[cfg(feature = "rustface")]
            Backend::Seeta(lazy) => lazy.dispose(),
            Backend::Unavailable(lazy) => lazy.dispose(),
        }
    }
}

impl Detector for Backend {
    async fn detect(&self, image: &RgbaImage) -> censor_core::Result<Vec<Region>> {
        match self {
            Backend::Static(detector) => detector.detect(image).await,
            #[cfg(feature = "rustface")]
            Backend::Seeta(detector) => detector.detect(image).await,
            Backend::Unavailable(detector) => detector.detect(image).await,
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_image(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image: {}", path.display()))?;
    Ok(image.to_rgba8())
}

fn save_image(image: RgbaImage, path: &Path) -> Result<()> {
    let is_jpeg = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));
    let result = if is_jpeg {
        // JPEG has no alpha channel.
        DynamicImage::ImageRgba8(image).to_rgb8().save(path)
    } else {
        image.save(path)
    };
    result.with_context(|| format!("failed to save image: {}", path.display()))
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

fn progress(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

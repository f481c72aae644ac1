//! consolidation — multi-pass face detection merged into one region set
//!
//! Pass 1 runs the detector at native resolution. Large images that yield at
//! most one face get a second pass on a downscaled copy, adopted only if it
//! finds strictly more. If the count is still at most one, overlapping tiles
//! are scanned and their results translated back into image space. All
//! candidates are then merged with greedy NMS and every survivor is given
//! landmarks.
//!
//! A failing detector never propagates: the native pass falling over yields
//! two synthetic regions so downstream effects still have something to draw.

use fast_image_resize as fr;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::detection::Detector;
use crate::error::{CensorError, Result};
use crate::geometry::Region;
use crate::landmarks::synthesize_landmarks;

// ── Constants ────────────────────────────────────────────────────────────────

/// Images whose larger side exceeds this get a downscaled second pass.
pub const DOWNSCALE_CUTOVER: u32 = 640;
/// Side length of the square detection tiles.
pub const TILE_SIZE: u32 = 512;
/// Fraction of a tile shared with its neighbour.
pub const TILE_OVERLAP: f32 = 0.25;
/// Tiled hits smaller than this on either side are detector artifacts.
pub const MIN_TILE_REGION: f32 = 16.0;
/// Allowed range for the NMS merge threshold.
pub const MERGE_THRESHOLD_RANGE: std::ops::RangeInclusive<f32> = 0.25..=0.35;

/// Synthetic fallback: region size and top-left corners as image fractions.
const SYNTHETIC_SIZE: (f32, f32) = (0.20, 0.25);
const SYNTHETIC_ORIGINS: [(f32, f32); 2] = [(0.20, 0.25), (0.60, 0.25)];
const SYNTHETIC_CONFIDENCE: f32 = 0.5;

// ── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidatorConfig {
    /// Candidates overlapping a kept region above this IoU are suppressed.
    pub merge_threshold: f32,
    /// Detector hits below this confidence are ignored.
    pub confidence_threshold: f32,
    /// Detector hits narrower or shorter than this (pixels) are ignored.
    pub min_region_size: f32,
}

impl Default for ConsolidatorConfig {
    fn default() -> Self {
        Self {
            merge_threshold: 0.3,
            confidence_threshold: 0.5,
            min_region_size: 20.0,
        }
    }
}

impl ConsolidatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !MERGE_THRESHOLD_RANGE.contains(&self.merge_threshold) {
            return Err(CensorError::InvalidConfig(format!(
                "merge threshold must be within {:?}, got {}",
                MERGE_THRESHOLD_RANGE, self.merge_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(CensorError::InvalidConfig(format!(
                "confidence threshold must be within 0..=1, got {}",
                self.confidence_threshold
            )));
        }
        if !self.min_region_size.is_finite() || self.min_region_size < 0.0 {
            return Err(CensorError::InvalidConfig(format!(
                "minimum region size must be non-negative, got {}",
                self.min_region_size
            )));
        }
        Ok(())
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

/// Result of one consolidation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Consolidation {
    /// Regions in NMS order (confidence descending).
    pub regions: Vec<Region>,
    /// The detector failed and `regions` are the synthetic fallback.
    pub synthetic: bool,
    /// The downscaled pass found more faces and replaced the native pass.
    pub used_downscaled: bool,
    /// Number of tiles scanned (0 when tiling did not run).
    pub tiles_scanned: usize,
}

// ── Consolidator ─────────────────────────────────────────────────────────────

pub struct Consolidator<D> {
    detector: D,
    config: ConsolidatorConfig,
}

impl<D: Detector> Consolidator<D> {
    pub fn new(detector: D, config: ConsolidatorConfig) -> Self {
        Self { detector, config }
    }

    pub fn config(&self) -> &ConsolidatorConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ConsolidatorConfig) {
        self.config = config;
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Mutable access, e.g. to dispose a [`crate::detection::LazyDetector`].
    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Detect, merge and landmark every face in `image`.
    pub async fn consolidate(&self, image: &RgbaImage) -> Consolidation {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Consolidation::default();
        }

        let native = match self.detector.detect(image).await {
            Ok(regions) => regions,
            Err(e) => {
                warn!("detection error, using synthetic regions: {e}");
                return Consolidation {
                    regions: synthetic_regions(width, height),
                    synthetic: true,
                    ..Consolidation::default()
                };
            }
        };

        let mut out = Consolidation::default();
        let mut candidates = self.admit(native, width, height);
        debug!(count = candidates.len(), "native pass");

        if candidates.len() <= 1 && width.max(height) > DOWNSCALE_CUTOVER {
            match self.downscaled_pass(image).await {
                Ok(scaled) if scaled.len() > candidates.len() => {
                    debug!(count = scaled.len(), "adopting downscaled pass");
                    candidates = scaled;
                    out.used_downscaled = true;
                }
                Ok(scaled) => debug!(count = scaled.len(), "downscaled pass not adopted"),
                Err(e) => warn!("downscaled pass skipped: {e}"),
            }
        }

        if candidates.len() <= 1 {
            let origins = tile_origins(width, height);
            if origins.len() > 1 {
                out.tiles_scanned = origins.len();
                let tiled = self.tiled_pass(image, &origins).await;
                debug!(tiles = origins.len(), count = tiled.len(), "tiled pass");
                candidates.extend(tiled);
            }
        }

        let mut regions = nms(candidates, self.config.merge_threshold);
        for region in &mut regions {
            if !region.has_landmarks() {
                region.landmarks = synthesize_landmarks(region);
            }
        }
        debug!(count = regions.len(), "consolidated regions");
        out.regions = regions;
        out
    }

    /// Clamp to the image and apply the confidence and size filters.
    fn admit(&self, raw: Vec<Region>, width: u32, height: u32) -> Vec<Region> {
        raw.into_iter()
            .filter_map(|region| match region.clamped(width, height) {
                Ok(r) => Some(r),
                Err(e) => {
                    debug!("dropping region: {e}");
                    None
                }
            })
            .filter(|r| r.confidence >= self.config.confidence_threshold)
            .filter(|r| {
                r.width >= self.config.min_region_size && r.height >= self.config.min_region_size
            })
            .collect()
    }

    async fn downscaled_pass(&self, image: &RgbaImage) -> Result<Vec<Region>> {
        let (width, height) = image.dimensions();
        let scale = DOWNSCALE_CUTOVER as f32 / width.max(height) as f32;
        let scaled_w = ((width as f32 * scale).round() as u32).max(1);
        let scaled_h = ((height as f32 * scale).round() as u32).max(1);
        let scaled = downscale(image, scaled_w, scaled_h)?;

        let raw = self.detector.detect(&scaled).await?;
        let restored = raw.into_iter().map(|r| r.scaled(1.0 / scale)).collect();
        Ok(self.admit(restored, width, height))
    }

    async fn tiled_pass(&self, image: &RgbaImage, origins: &[(u32, u32)]) -> Vec<Region> {
        let (width, height) = image.dimensions();
        let mut found = Vec::new();
        for &(tx, ty) in origins {
            let tw = TILE_SIZE.min(width - tx);
            let th = TILE_SIZE.min(height - ty);
            let tile = image::imageops::crop_imm(image, tx, ty, tw, th).to_image();
            let raw = match self.detector.detect(&tile).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(tx, ty, "tile detection error: {e}");
                    continue;
                }
            };
            let translated: Vec<Region> = raw
                .into_iter()
                .filter(|r| r.width >= MIN_TILE_REGION && r.height >= MIN_TILE_REGION)
                .map(|r| r.translated(tx as f32, ty as f32))
                .collect();
            found.extend(self.admit(translated, width, height));
        }
        found
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Greedy NMS: sort by confidence descending (stable, so ties keep input
/// order) and keep a region only if its IoU with every kept region is at or
/// below `threshold`.
pub fn nms(mut regions: Vec<Region>, threshold: f32) -> Vec<Region> {
    regions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Region> = Vec::with_capacity(regions.len());
    for region in regions {
        if kept.iter().all(|k| k.iou(&region) <= threshold) {
            kept.push(region);
        }
    }
    kept
}

/// Top-left corners of the overlapping square tiles covering the image.
///
/// The last tile on each axis is pushed flush against the far edge.
pub fn tile_origins(width: u32, height: u32) -> Vec<(u32, u32)> {
    let xs = axis_origins(width);
    let ys = axis_origins(height);
    ys.iter()
        .flat_map(|&y| xs.iter().map(move |&x| (x, y)))
        .collect()
}

fn axis_origins(len: u32) -> Vec<u32> {
    if len <= TILE_SIZE {
        return vec![0];
    }
    let stride = ((TILE_SIZE as f32 * (1.0 - TILE_OVERLAP)).round() as u32).max(1);
    let last = len - TILE_SIZE;
    let mut origins: Vec<u32> = (0..last).step_by(stride as usize).collect();
    origins.push(last);
    origins
}

/// The last-resort region set used when the detector cannot run.
pub fn synthetic_regions(width: u32, height: u32) -> Vec<Region> {
    let (w, h) = (width as f32, height as f32);
    SYNTHETIC_ORIGINS
        .iter()
        .filter_map(|&(fx, fy)| {
            Region::new(
                w * fx,
                h * fy,
                (w * SYNTHETIC_SIZE.0).max(1.0),
                (h * SYNTHETIC_SIZE.1).max(1.0),
                SYNTHETIC_CONFIDENCE,
            )
            .clamped(width, height)
            .ok()
        })
        .map(|region| {
            let landmarks = synthesize_landmarks(&region);
            region.with_landmarks(landmarks)
        })
        .collect()
}

fn downscale(image: &RgbaImage, out_w: u32, out_h: u32) -> Result<RgbaImage> {
    let src = fr::images::ImageRef::new(
        image.width(),
        image.height(),
        image.as_raw(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| CensorError::Resize(e.to_string()))?;

    let mut dst = fr::images::Image::new(out_w, out_h, fr::PixelType::U8x4);
    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
    fr::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .map_err(|e| CensorError::Resize(e.to_string()))?;

    RgbaImage::from_raw(out_w, out_h, dst.into_vec())
        .ok_or_else(|| CensorError::Resize("resized buffer has the wrong length".into()))
}

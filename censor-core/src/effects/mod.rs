//! effects — per-region pixel transforms
//!
//! Every effect is a function of (buffer, clamped rectangle, optional
//! landmarks, parameters) that rewrites the buffer in place. Rectangles are
//! `PixelRect`s, so no effect can touch a pixel outside the buffer.

use std::fmt;
use std::str::FromStr;

use image::{Rgba, RgbaImage};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::consolidation::ConsolidatorConfig;
use crate::error::{CensorError, Result};
use crate::geometry::{PixelRect, Region};
use crate::landmarks::resolve_eye_band;

pub mod blur;
pub mod fill;
pub mod glyph;
pub mod overlay;
pub mod pixel_sort;
pub mod pixelate;

/// Colour of solid masks and eye bars.
pub const MASK_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
/// Blur radius when the whole face is blurred.
pub const FACE_BLUR_RADIUS: u32 = 8;
/// Blur radius when only the eye band is blurred.
pub const EYE_BLUR_RADIUS: u32 = 6;

pub const BLOCK_SIZE_RANGE: std::ops::RangeInclusive<u32> = 4..=20;
pub const SORT_INTENSITY_RANGE: std::ops::RangeInclusive<u32> = 10..=100;
pub const CONFIDENCE_RANGE: std::ops::RangeInclusive<f32> = 0.1..=1.0;
pub const MIN_REGION_SIZE_RANGE: std::ops::RangeInclusive<u32> = 20..=200;

/// The censoring effect applied to every region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectKind {
    #[default]
    BlackSquare,
    EyeBar,
    PixelatedEyes,
    PixelatedFace,
    PixelSort,
    PixelsortEyeBar,
    BlurFace,
    BlurEyes,
    Wireframe,
    ShowLandmarks,
}

impl EffectKind {
    pub const ALL: [EffectKind; 10] = [
        EffectKind::BlackSquare,
        EffectKind::EyeBar,
        EffectKind::PixelatedEyes,
        EffectKind::PixelatedFace,
        EffectKind::PixelSort,
        EffectKind::PixelsortEyeBar,
        EffectKind::BlurFace,
        EffectKind::BlurEyes,
        EffectKind::Wireframe,
        EffectKind::ShowLandmarks,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::BlackSquare => "black-square",
            EffectKind::EyeBar => "eye-bar",
            EffectKind::PixelatedEyes => "pixelated-eyes",
            EffectKind::PixelatedFace => "pixelated-face",
            EffectKind::PixelSort => "pixel-sort",
            EffectKind::PixelsortEyeBar => "pixelsort-eye-bar",
            EffectKind::BlurFace => "blur-face",
            EffectKind::BlurEyes => "blur-eyes",
            EffectKind::Wireframe => "wireframe",
            EffectKind::ShowLandmarks => "show-landmarks",
        }
    }

    /// Diagnostic overlays draw on top of the face instead of hiding it.
    pub fn is_overlay(self) -> bool {
        matches!(self, EffectKind::Wireframe | EffectKind::ShowLandmarks)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectKind {
    type Err = CensorError;

    fn from_str(s: &str) -> Result<Self> {
        EffectKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = EffectKind::ALL.iter().map(|k| k.name()).collect();
                CensorError::InvalidConfig(format!(
                    "unknown effect `{s}`, expected one of: {}",
                    names.join(", ")
                ))
            })
    }
}

/// Effect selection plus its tunable parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    pub kind: EffectKind,
    /// Pixelation block side in pixels.
    pub block_size: u32,
    /// Pixel-sort intensity in percent.
    pub sort_intensity: u32,
    /// Detections below this confidence are ignored.
    pub confidence_threshold: f32,
    /// Detections smaller than this (pixels, either side) are ignored.
    pub min_region_size: u32,
    /// Text printed by overlay effects.
    pub label: Option<String>,
    /// Seed for the pixel-sort random source.
    pub seed: u64,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            kind: EffectKind::default(),
            block_size: 10,
            sort_intensity: 50,
            confidence_threshold: 0.5,
            min_region_size: 20,
            label: None,
            seed: 0,
        }
    }
}

impl EffectConfig {
    pub fn new(kind: EffectKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !BLOCK_SIZE_RANGE.contains(&self.block_size) {
            return Err(CensorError::InvalidConfig(format!(
                "block size must be within {:?}, got {}",
                BLOCK_SIZE_RANGE, self.block_size
            )));
        }
        if !SORT_INTENSITY_RANGE.contains(&self.sort_intensity) {
            return Err(CensorError::InvalidConfig(format!(
                "sort intensity must be within {:?}, got {}",
                SORT_INTENSITY_RANGE, self.sort_intensity
            )));
        }
        if !CONFIDENCE_RANGE.contains(&self.confidence_threshold) {
            return Err(CensorError::InvalidConfig(format!(
                "confidence threshold must be within {:?}, got {}",
                CONFIDENCE_RANGE, self.confidence_threshold
            )));
        }
        if !MIN_REGION_SIZE_RANGE.contains(&self.min_region_size) {
            return Err(CensorError::InvalidConfig(format!(
                "minimum region size must be within {:?}, got {}",
                MIN_REGION_SIZE_RANGE, self.min_region_size
            )));
        }
        Ok(())
    }

    /// Detection filters carried by this config, with the default merge threshold.
    pub fn consolidator_config(&self) -> ConsolidatorConfig {
        ConsolidatorConfig {
            confidence_threshold: self.confidence_threshold,
            min_region_size: self.min_region_size as f32,
            ..ConsolidatorConfig::default()
        }
    }
}

/// Apply `config.kind` to one region of `buffer`.
///
/// Fails with `DegenerateRegion` when the region (or the eye band an effect
/// needs) has no pixels inside the buffer; the buffer is untouched then.
pub fn apply_effect<R: Rng>(
    buffer: &mut RgbaImage,
    region: &Region,
    config: &EffectConfig,
    rng: &mut R,
) -> Result<()> {
    let (width, height) = buffer.dimensions();
    let face = region
        .pixel_rect(width, height)
        .ok_or(CensorError::DegenerateRegion {
            width: region.width,
            height: region.height,
        })?;
    let eyes = || eye_rect(region, width, height);

    match config.kind {
        EffectKind::BlackSquare => fill::fill_rect(buffer, face, MASK_COLOR),
        EffectKind::EyeBar => {
            fill::draw_rotated_bar(buffer, &resolve_eye_band(region), MASK_COLOR)
        }
        EffectKind::PixelatedEyes => pixelate::pixelate(buffer, eyes()?, config.block_size),
        EffectKind::PixelatedFace => pixelate::pixelate(buffer, face, config.block_size),
        EffectKind::PixelSort => {
            pixel_sort::sort_region(buffer, face, config.sort_intensity, rng)
        }
        EffectKind::PixelsortEyeBar => {
            pixel_sort::sort_eye_band(buffer, eyes()?, config.sort_intensity)
        }
        EffectKind::BlurFace => blur::box_blur(buffer, face, FACE_BLUR_RADIUS),
        EffectKind::BlurEyes => blur::box_blur(buffer, eyes()?, EYE_BLUR_RADIUS),
        EffectKind::Wireframe => {
            overlay::draw_wireframe(buffer, region, config.label.as_deref())
        }
        EffectKind::ShowLandmarks => {
            overlay::draw_landmark_dump(buffer, region, config.label.as_deref())
        }
    }
    Ok(())
}

fn eye_rect(region: &Region, width: u32, height: u32) -> Result<PixelRect> {
    let band = resolve_eye_band(region);
    band.bounds(width, height).ok_or(CensorError::DegenerateRegion {
        width: band.length,
        height: band.thickness,
    })
}

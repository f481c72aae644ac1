#![allow(dead_code)]

use std::sync::Mutex;

use censor_core::{CensorError, Detector, Region};
use image::{Rgba, RgbaImage};

/// Deterministic noise fixture.
pub fn fixture(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let h = (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663))
            .wrapping_mul(2_654_435_761);
        let [_, a, b, c] = h.to_le_bytes();
        Rgba([a, b, c, 255])
    })
}

/// Detector whose answer depends on the size of the image it is handed.
/// Records every call so tests can see which passes ran.
pub struct ScriptedDetector {
    script: Box<dyn Fn(u32, u32) -> Vec<Region> + Send + Sync>,
    calls: Mutex<Vec<(u32, u32)>>,
}

impl ScriptedDetector {
    pub fn new(script: impl Fn(u32, u32) -> Vec<Region> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Detector for ScriptedDetector {
    async fn detect(&self, image: &RgbaImage) -> censor_core::Result<Vec<Region>> {
        let (w, h) = image.dimensions();
        self.calls.lock().unwrap().push((w, h));
        Ok((self.script)(w, h))
    }
}

/// Detector that is always unavailable.
pub struct BrokenDetector;

impl Detector for BrokenDetector {
    async fn detect(&self, _image: &RgbaImage) -> censor_core::Result<Vec<Region>> {
        Err(CensorError::DetectionUnavailable("model offline".into()))
    }
}

pub fn assert_contained(regions: &[Region], width: u32, height: u32) {
    for r in regions {
        assert!(r.width > 0.0 && r.height > 0.0, "{r:?} is empty");
        assert!(r.x >= 0.0 && r.y >= 0.0, "{r:?} starts outside the image");
        assert!(
            r.right() <= width as f32 + 1e-3 && r.bottom() <= height as f32 + 1e-3,
            "{r:?} ends outside {width}x{height}"
        );
        assert!((0.0..=1.0).contains(&r.confidence));
    }
}

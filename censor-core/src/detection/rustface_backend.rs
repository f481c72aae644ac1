use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::{GrayImage, RgbaImage};
use tokio::task;
use tracing::debug;

use super::Detector;
use crate::error::{CensorError, Result};
use crate::geometry::Region;

/// SeetaFace scores are unbounded; this score maps to confidence 1.0.
const SCORE_CEILING: f64 = 10.0;
const MIN_FACE_SIZE: u32 = 20;
const SCORE_THRESHOLD: f64 = 2.0;

/// Face detector backed by the `rustface` crate (SeetaFace cascade).
pub struct RustfaceDetector {
    model: rustface::Model,
}

impl RustfaceDetector {
    /// Load a SeetaFace model file (e.g. `seeta_fd_frontal_v1.0.bin`).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            CensorError::DetectionUnavailable(format!("{}: {e}", path.display()))
        })?;
        let model = rustface::read_model(BufReader::new(file))
            .map_err(|e| CensorError::DetectionUnavailable(format!("bad model: {e}")))?;
        debug!(path = %path.display(), "loaded SeetaFace model");
        Ok(Self { model })
    }
}

/// Runs the cascade over an owned grayscale copy; called on the blocking pool.
fn detect_blocking(model: rustface::Model, gray: GrayImage) -> Vec<Region> {
    let mut detector = rustface::create_detector_with_model(model);
    detector.set_min_face_size(MIN_FACE_SIZE);
    detector.set_score_thresh(SCORE_THRESHOLD);
    detector.set_pyramid_scale_factor(0.8);
    detector.set_slide_window_step(4, 4);

    let faces = detector.detect(&rustface::ImageData::new(
        gray.as_raw(),
        gray.width(),
        gray.height(),
    ));

    faces
        .iter()
        .map(|face| {
            let bbox = face.bbox();
            Region::new(
                bbox.x() as f32,
                bbox.y() as f32,
                bbox.width() as f32,
                bbox.height() as f32,
                (face.score() / SCORE_CEILING).clamp(0.0, 1.0) as f32,
            )
        })
        .collect()
}

impl Detector for RustfaceDetector {
    /// Must be awaited inside a tokio runtime; the cascade runs on
    /// `spawn_blocking` so the executor thread stays free.
    async fn detect(&self, image: &RgbaImage) -> Result<Vec<Region>> {
        let model = self.model.clone();
        let gray = image::imageops::grayscale(image);
        task::spawn_blocking(move || detect_blocking(model, gray))
            .await
            .map_err(|e| CensorError::DetectionUnavailable(format!("detector task failed: {e}")))
    }
}

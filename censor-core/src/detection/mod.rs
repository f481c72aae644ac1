//! detection — the face detector seam
//!
//! The detector is the one external, suspending collaborator of the engine.
//! Whatever shape a backend produces is converted into `Region` before it
//! leaves the backend; nothing untyped crosses this boundary.

use std::future::Future;
use std::sync::OnceLock;

use image::RgbaImage;
use tracing::debug;

use crate::error::{CensorError, Result};
use crate::geometry::Region;

#[cfg(feature = "rustface")]
mod rustface_backend;
#[cfg(feature = "rustface")]
pub use rustface_backend::RustfaceDetector;

/// Pluggable face detection backend.
///
/// Implementations return candidate regions in the pixel coordinates of the
/// image they were handed, or `DetectionUnavailable` when the underlying
/// model cannot run. "No faces" is `Ok(vec![])`, never an error.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &RgbaImage) -> impl Future<Output = Result<Vec<Region>>> + Send;
}

type Factory<D> = Box<dyn Fn() -> Result<D> + Send + Sync>;

/// Memoised detector handle: built on first use, reused afterwards, released
/// by [`LazyDetector::dispose`].
pub struct LazyDetector<D> {
    factory: Factory<D>,
    cell: OnceLock<D>,
}

impl<D: Detector> LazyDetector<D> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<D> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            cell: OnceLock::new(),
        }
    }

    /// Return the detector, constructing it if this is the first call.
    pub fn get(&self) -> Result<&D> {
        if let Some(detector) = self.cell.get() {
            return Ok(detector);
        }
        let detector = (self.factory)().map_err(|e| match e {
            CensorError::DetectionUnavailable(_) => e,
            other => CensorError::DetectionUnavailable(other.to_string()),
        })?;
        debug!("detector constructed");
        // A concurrent initialiser may have won; either value is equivalent.
        let _ = self.cell.set(detector);
        self.cell
            .get()
            .ok_or_else(|| CensorError::DetectionUnavailable("detector not initialised".into()))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Drop the underlying detector. The next `detect` call rebuilds it.
    pub fn dispose(&mut self) {
        if self.cell.take().is_some() {
            debug!("detector disposed");
        }
    }
}

impl<D: Detector> Detector for LazyDetector<D> {
    async fn detect(&self, image: &RgbaImage) -> Result<Vec<Region>> {
        let detector = self.get()?;
        detector.detect(image).await
    }
}

/// Detector that replays caller-supplied regions, e.g. detections computed
/// earlier or loaded from a report file.
#[derive(Debug, Clone, Default)]
pub struct StaticDetector {
    regions: Vec<Region>,
}

impl StaticDetector {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }
}

impl Detector for StaticDetector {
    async fn detect(&self, image: &RgbaImage) -> Result<Vec<Region>> {
        debug!(
            count = self.regions.len(),
            width = image.width(),
            height = image.height(),
            "replaying static regions"
        );
        Ok(self.regions.clone())
    }
}

use std::time::{Duration, Instant};

use image::RgbaImage;

use crate::consolidation::{Consolidation, Consolidator, ConsolidatorConfig};
use crate::detection::Detector;
use crate::effects::EffectConfig;
use crate::error::Result;
use crate::geometry::Region;
use crate::rendering::{Compositor, RenderSummary};

/// One censored image plus what was found in it.
#[derive(Debug, Clone)]
pub struct Processed {
    pub image: RgbaImage,
    pub consolidation: Consolidation,
    pub summary: RenderSummary,
    pub detect_time: Duration,
    pub render_time: Duration,
}

impl Processed {
    pub fn regions(&self) -> &[Region] {
        &self.consolidation.regions
    }
}

/// Detector → Consolidator → Compositor for one image at a time.
pub struct Pipeline<D> {
    consolidator: Consolidator<D>,
    compositor: Compositor,
    prof_images: u64,
    prof_detect: Duration,
    prof_render: Duration,
}

impl<D: Detector> Pipeline<D> {
    pub fn new(detector: D, config: EffectConfig) -> Result<Self> {
        let consolidator_config = config.consolidator_config();
        consolidator_config.validate()?;
        let compositor = Compositor::new(config)?;
        Ok(Self::from_parts(
            Consolidator::new(detector, consolidator_config),
            compositor,
        ))
    }

    pub fn from_parts(consolidator: Consolidator<D>, compositor: Compositor) -> Self {
        Self {
            consolidator,
            compositor,
            prof_images: 0,
            prof_detect: Duration::ZERO,
            prof_render: Duration::ZERO,
        }
    }

    pub fn effect(&self) -> &EffectConfig {
        self.compositor.config()
    }

    /// Change the effect and its filters. Cached regions from an earlier
    /// [`Pipeline::detect`] can be re-rendered with [`Pipeline::render`].
    pub fn set_effect(&mut self, config: EffectConfig) -> Result<()> {
        let consolidator_config = ConsolidatorConfig {
            merge_threshold: self.consolidator.config().merge_threshold,
            ..config.consolidator_config()
        };
        consolidator_config.validate()?;
        self.compositor.set_config(config)?;
        self.consolidator.set_config(consolidator_config);
        Ok(())
    }

    /// Run detection and consolidation only.
    pub async fn detect(&self, image: &RgbaImage) -> Consolidation {
        self.consolidator.consolidate(image).await
    }

    /// Render already-consolidated regions onto `image` in place.
    pub fn render(&mut self, image: &mut RgbaImage, regions: &[Region]) -> RenderSummary {
        self.compositor.render(image, regions)
    }

    /// Detect faces in `image` and censor every one of them.
    pub async fn process(&mut self, mut image: RgbaImage) -> Processed {
        let detect_start = Instant::now();
        let consolidation = self.consolidator.consolidate(&image).await;
        let detect_time = detect_start.elapsed();

        let render_start = Instant::now();
        let summary = self.compositor.render(&mut image, &consolidation.regions);
        let render_time = render_start.elapsed();

        self.prof_detect += detect_time;
        self.prof_render += render_time;
        self.prof_images += 1;
        tracing::debug!(
            regions = consolidation.regions.len(),
            synthetic = consolidation.synthetic,
            applied = summary.applied,
            skipped = summary.skipped,
            detect_ms = format!("{:.2}", detect_time.as_secs_f64() * 1000.0),
            render_ms = format!("{:.2}", render_time.as_secs_f64() * 1000.0),
            "image processed"
        );
        if self.prof_images % 25 == 0 {
            tracing::info!(
                images = self.prof_images,
                detect_ms_per_image = format!(
                    "{:.2}",
                    self.prof_detect.as_secs_f64() * 1000.0 / self.prof_images as f64
                ),
                render_ms_per_image = format!(
                    "{:.2}",
                    self.prof_render.as_secs_f64() * 1000.0 / self.prof_images as f64
                ),
                "pipeline timings"
            );
        }

        Processed {
            image,
            consolidation,
            summary,
            detect_time,
            render_time,
        }
    }

    pub fn detector_mut(&mut self) -> &mut D {
        self.consolidator.detector_mut()
    }
}

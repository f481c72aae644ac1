pub mod consolidation;
pub mod detection;
pub mod effects;
pub mod error;
pub mod geometry;
pub mod landmarks;
pub mod pipeline;
pub mod rendering;

// Re-export the common types so callers can stay at the crate root.
pub use consolidation::{Consolidation, Consolidator, ConsolidatorConfig};
pub use detection::{Detector, LazyDetector, StaticDetector};
pub use effects::{apply_effect, EffectConfig, EffectKind};
pub use error::{CensorError, Result};
pub use geometry::{PixelRect, Point, Region};
pub use pipeline::{Pipeline, Processed};
pub use rendering::{Compositor, RenderSummary};

#[cfg(feature = "rustface")]
pub use detection::RustfaceDetector;

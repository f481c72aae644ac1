use thiserror::Error;

#[derive(Debug, Error)]
pub enum CensorError {
    /// The detector threw or could not be constructed. Recovered inside the
    /// consolidator; callers of the pipeline never see it.
    #[error("face detection unavailable: {0}")]
    DetectionUnavailable(String),

    #[error("degenerate region {width}x{height} after clamping")]
    DegenerateRegion { width: f32, height: f32 },

    #[error("invalid effect configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to resize image for detection: {0}")]
    Resize(String),
}

pub type Result<T> = std::result::Result<T, CensorError>;

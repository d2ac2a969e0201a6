use thiserror::Error;

/// Failures raised while turning an upload into a captioned portrait.
#[derive(Debug, Error)]
pub enum PortraitError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("image dimensions are zero")]
    ZeroDimensions,

    #[error("no face detected")]
    NoFaceDetected,

    #[error("crop region {left},{top} -> {right},{bottom} is empty")]
    EmptyCrop { left: u32, top: u32, right: u32, bottom: u32 },

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("invalid caption font: {0}")]
    Font(String),

    #[error("face detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("render task failed: {0}")]
    Task(String),
}

//! The portrait pipeline: locate a face, plan a crop around it, and render a captioned portrait.
//!
//! Everything in here is synchronous and CPU-bound. [`PortraitPipeline::run`] moves the work onto
//! the blocking thread pool so request handlers can await it.

pub mod crop;
pub mod error;
pub mod face;
pub mod render;

use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use tracing::{debug, instrument};

pub use crop::{CropRegion, plan_crop};
pub use error::PortraitError;
pub use face::{Detection, FaceBox, FaceDetector, RustfaceDetector, locate_face};
pub use render::{OUTPUT_SIZE, PortraitRenderer, RenderedPortrait};

/// Result of running the pipeline over one upload.
#[derive(Debug, Clone)]
pub struct ProcessedPortrait {
    pub rendered: RenderedPortrait,
    /// Face the crop was planned around; `None` when the centered fallback was used.
    pub face: Option<FaceBox>,
    pub region: CropRegion,
}

/// Shared handle to the detector and renderer, built once at startup.
#[derive(Clone)]
pub struct PortraitPipeline {
    detector: Arc<dyn FaceDetector>,
    renderer: Arc<PortraitRenderer>,
}

impl PortraitPipeline {
    pub fn new(detector: Arc<dyn FaceDetector>, renderer: Arc<PortraitRenderer>) -> Self {
        Self { detector, renderer }
    }

    /// Process `input` on the current thread.
    ///
    /// With `require_face` set, an image without a detectable face fails with
    /// [`PortraitError::NoFaceDetected`]; otherwise the largest centered square is used.
    pub fn process(&self, input: &[u8], caption: &str, require_face: bool) -> Result<ProcessedPortrait, PortraitError> {
        let image = decode_image(input)?;
        let (width, height) = (image.width(), image.height());

        let face = locate_face(self.detector.as_ref(), &image);
        if face.is_none() && require_face {
            return Err(PortraitError::NoFaceDetected);
        }

        let region = plan_crop(face.as_ref(), width, height);
        debug!(?region, face_found = face.is_some(), "Planned crop");

        let rendered = self.renderer.render(&image, region, caption)?;

        Ok(ProcessedPortrait { rendered, face, region })
    }

    /// Process `input` on the blocking thread pool.
    #[instrument(skip(self, input), fields(input_bytes = input.len()))]
    pub async fn run(&self, input: Vec<u8>, caption: String, require_face: bool) -> Result<ProcessedPortrait, PortraitError> {
        let pipeline = self.clone();
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || pipeline.process(&input, &caption, require_face))
            .await
            .map_err(|e| PortraitError::Task(e.to_string()))?;

        metrics::histogram!("portraitd_pipeline_duration_seconds").record(started.elapsed().as_secs_f64());
        result
    }
}

/// Decode JPEG or PNG bytes, rejecting images with a zero dimension.
pub fn decode_image(input: &[u8]) -> Result<DynamicImage, PortraitError> {
    let image = image::load_from_memory(input).map_err(|e| PortraitError::Decode(e.to_string()))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(PortraitError::ZeroDimensions);
    }
    Ok(image)
}

//! Face location: run a detector over the grayscale image and keep the most prominent face.

use std::io::BufReader;
use std::path::Path;

use image::DynamicImage;
use tracing::{debug, info};

use super::error::PortraitError;
use crate::config::FaceDetectionConfig;

/// Bounding box of the chosen face, in source image pixels.
///
/// Always lies inside the image: `x + width <= image_width` and `y + height <= image_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub image_width: u32,
    pub image_height: u32,
}

impl FaceBox {
    /// Clamp a raw detector rectangle into the image.
    ///
    /// Returns `None` when no part of the rectangle overlaps the image.
    pub fn clamped(x: i64, y: i64, width: i64, height: i64, image_width: u32, image_height: u32) -> Option<Self> {
        let (max_x, max_y) = (i64::from(image_width), i64::from(image_height));
        let left = x.clamp(0, max_x);
        let top = y.clamp(0, max_y);
        let right = x.saturating_add(width).clamp(0, max_x);
        let bottom = y.saturating_add(height).clamp(0, max_y);

        if right <= left || bottom <= top {
            return None;
        }

        Some(Self {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
            image_width,
            image_height,
        })
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A face rectangle as reported by a detector backend, possibly overhanging the image.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub score: f64,
}

/// Pluggable face detection backend.
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a row-major grayscale buffer of `width` × `height` bytes.
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<Detection>;
}

/// Largest face by area. On ties the first detection wins.
pub fn largest_face(detections: &[Detection], image_width: u32, image_height: u32) -> Option<FaceBox> {
    detections
        .iter()
        .filter_map(|d| {
            FaceBox::clamped(
                i64::from(d.x),
                i64::from(d.y),
                i64::from(d.width),
                i64::from(d.height),
                image_width,
                image_height,
            )
        })
        .reduce(|best, candidate| if candidate.area() > best.area() { candidate } else { best })
}

/// Run `detector` over `image` and return the most prominent face, if any.
pub fn locate_face(detector: &dyn FaceDetector, image: &DynamicImage) -> Option<FaceBox> {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let detections = detector.detect(gray.as_raw(), width, height);

    debug!(faces = detections.len(), width, height, "Face detection finished");

    let face = largest_face(&detections, width, height);
    if let Some(face) = &face {
        info!(
            x = face.x,
            y = face.y,
            width = face.width,
            height = face.height,
            "Face detected"
        );
    }
    face
}

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// The model is parsed once; each detection call works on a fresh detector built from a clone
/// of it, so the type can be shared between requests without locking.
pub struct RustfaceDetector {
    model: rustface::Model,
    min_face_size: u32,
    score_threshold: f64,
    pyramid_scale_factor: f32,
    slide_window_step: u32,
}

impl RustfaceDetector {
    /// Load the SeetaFace frontal model from `config.model_path`.
    pub fn load(config: &FaceDetectionConfig) -> Result<Self, PortraitError> {
        let model = read_model_file(&config.model_path)?;
        info!(path = %config.model_path.display(), "Loaded face detection model");

        Ok(Self {
            model,
            min_face_size: config.min_face_size,
            score_threshold: config.score_threshold,
            pyramid_scale_factor: config.pyramid_scale_factor,
            slide_window_step: config.slide_window_step,
        })
    }
}

fn read_model_file(path: &Path) -> Result<rustface::Model, PortraitError> {
    let file = std::fs::File::open(path)
        .map_err(|e| PortraitError::DetectorUnavailable(format!("cannot open model {}: {e}", path.display())))?;
    rustface::read_model(BufReader::new(file))
        .map_err(|e| PortraitError::DetectorUnavailable(format!("cannot parse model {}: {e}", path.display())))
}

impl FaceDetector for RustfaceDetector {
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<Detection> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.min_face_size);
        detector.set_score_thresh(self.score_threshold);
        detector.set_pyramid_scale_factor(self.pyramid_scale_factor);
        detector.set_slide_window_step(self.slide_window_step, self.slide_window_step);

        detector
            .detect(&rustface::ImageData::new(gray, width, height))
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                Detection {
                    x: bbox.x(),
                    y: bbox.y(),
                    width: bbox.width(),
                    height: bbox.height(),
                    score: face.score(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x: i32, y: i32, width: u32, height: u32) -> Detection {
        Detection {
            x,
            y,
            width,
            height,
            score: 5.0,
        }
    }

    struct FixedDetector(Vec<Detection>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _gray: &[u8], _width: u32, _height: u32) -> Vec<Detection> {
            self.0.clone()
        }
    }

    #[test]
    fn largest_face_prefers_biggest_area() {
        let detections = vec![detection(10, 10, 40, 40), detection(100, 100, 90, 80), detection(300, 20, 60, 60)];
        let face = largest_face(&detections, 640, 480).unwrap();
        assert_eq!((face.x, face.y, face.width, face.height), (100, 100, 90, 80));
        assert_eq!((face.image_width, face.image_height), (640, 480));
    }

    #[test]
    fn largest_face_keeps_first_on_tie() {
        let detections = vec![detection(0, 0, 50, 50), detection(200, 200, 50, 50)];
        let face = largest_face(&detections, 640, 480).unwrap();
        assert_eq!((face.x, face.y), (0, 0));
    }

    #[test]
    fn largest_face_none_when_empty() {
        assert!(largest_face(&[], 640, 480).is_none());
    }

    #[test]
    fn overhanging_detection_is_clamped_into_image() {
        let face = largest_face(&[detection(-20, -10, 100, 100)], 200, 200).unwrap();
        assert_eq!((face.x, face.y, face.width, face.height), (0, 0, 80, 90));

        let face = largest_face(&[detection(150, 170, 100, 100)], 200, 200).unwrap();
        assert_eq!((face.x, face.y, face.width, face.height), (150, 170, 50, 30));
        assert!(face.x + face.width <= face.image_width);
        assert!(face.y + face.height <= face.image_height);
    }

    #[test]
    fn detection_outside_image_is_ignored() {
        assert!(largest_face(&[detection(500, 500, 40, 40)], 200, 200).is_none());
        assert!(largest_face(&[detection(-100, 0, 50, 50)], 200, 200).is_none());
    }

    #[test]
    fn locate_face_runs_detector_over_image() {
        let image = DynamicImage::new_rgb8(320, 240);
        let detector = FixedDetector(vec![detection(100, 60, 80, 100)]);
        let face = locate_face(&detector, &image).unwrap();
        assert_eq!((face.x, face.y, face.width, face.height), (100, 60, 80, 100));
        assert_eq!((face.image_width, face.image_height), (320, 240));
    }

    #[test]
    fn missing_model_file_is_reported() {
        let config = FaceDetectionConfig {
            model_path: "/nonexistent/seeta_fd_frontal_v1.0.bin".into(),
            ..Default::default()
        };
        let err = RustfaceDetector::load(&config).err().unwrap();
        assert!(matches!(err, PortraitError::DetectorUnavailable(_)));
    }
}

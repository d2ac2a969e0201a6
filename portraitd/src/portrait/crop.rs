//! Crop planning: turn a face box into the square region that becomes the portrait.

use super::face::FaceBox;
use super::render::OUTPUT_SIZE;

/// Fraction of the output frame the face is meant to fill.
///
/// Kept for reference only: the crop below is sized from the raw face box and no scale factor
/// derived from this target is applied before cropping.
pub const TARGET_FACE_RATIO: f64 = 0.75;

/// Intended face height in the output frame (450px for a 600px portrait).
pub const TARGET_FACE_HEIGHT: f64 = OUTPUT_SIZE as f64 * TARGET_FACE_RATIO;

/// Space above the face, relative to face height.
const HEADROOM_RATIO: f64 = 0.3;

/// Space on each side of the face, relative to face width.
const SIDE_PADDING_RATIO: f64 = 0.15;

/// Space below the face (chin and neck), relative to face height.
const CHIN_RATIO: f64 = 0.2;

/// Region of the source image, as half-open pixel edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRegion {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn is_square(&self) -> bool {
        self.width() == self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Plan the crop for an image, framing `face` when one was found.
pub fn plan_crop(face: Option<&FaceBox>, image_width: u32, image_height: u32) -> CropRegion {
    match face {
        Some(face) => face_crop(face, image_width, image_height),
        None => center_square(image_width, image_height),
    }
}

/// Square around the face with headroom above and padding on both sides, clamped to the image.
///
/// The region is only smaller than the planned edge (and then possibly not square) when the
/// image itself is smaller than that edge along an axis.
pub fn face_crop(face: &FaceBox, image_width: u32, image_height: u32) -> CropRegion {
    let (x, y) = (i64::from(face.x), i64::from(face.y));
    let (w, h) = (i64::from(face.width), i64::from(face.height));

    let headroom = scaled(h, HEADROOM_RATIO);
    let side_padding = scaled(w, SIDE_PADDING_RATIO);
    let crop_size = f64::max((w + 2 * side_padding) as f64, (h + headroom) as f64 + h as f64 * CHIN_RATIO) as i64;

    let center_x = x + w / 2;
    let center_y = y + h / 2 - headroom / 2;

    let (left, right) = fit_span(center_x - crop_size / 2, crop_size, i64::from(image_width));
    let (top, bottom) = fit_span(center_y - crop_size / 2, crop_size, i64::from(image_height));

    CropRegion {
        left: left as u32,
        top: top as u32,
        right: right as u32,
        bottom: bottom as u32,
    }
}

/// `length * ratio` rounded to the nearest pixel, halves away from zero (15 * 0.3 -> 5, not 4).
fn scaled(length: i64, ratio: f64) -> i64 {
    (length as f64 * ratio).round() as i64
}

/// Place a span of `size` starting at `start` inside `[0, limit]`.
///
/// A span cut short at the far edge is pushed back toward zero; one starting at zero is
/// extended as far as the limit allows.
fn fit_span(start: i64, size: i64, limit: i64) -> (i64, i64) {
    let mut lo = start.max(0);
    let mut hi = (lo + size).min(limit);

    if hi - lo < size {
        if lo == 0 {
            hi = (lo + size).min(limit);
        } else {
            lo = (hi - size).max(0);
        }
    }

    (lo, hi)
}

/// Largest centered square, used when there is no face to frame.
pub fn center_square(image_width: u32, image_height: u32) -> CropRegion {
    let edge = image_width.min(image_height);
    let left = (image_width - edge) / 2;
    let top = (image_height - edge) / 2;

    CropRegion {
        left,
        top,
        right: left + edge,
        bottom: top + edge,
    }
}

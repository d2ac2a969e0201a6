//! Portrait rendering: crop, resize to the canonical frame, stamp the caption, encode as JPEG.

use std::path::PathBuf;

use ab_glyph::FontVec;
use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, Rgb, RgbImage, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use tracing::{debug, info, warn};

use super::crop::CropRegion;
use super::error::PortraitError;
use crate::config::CaptionConfig;

/// Edge length of every rendered portrait, in pixels.
pub const OUTPUT_SIZE: u32 = 600;

pub const JPEG_QUALITY: u8 = 95;

const OUTPUT_DPI: u16 = 300;

/// Gap between the bottom of the caption and the bottom edge of the portrait.
const CAPTION_BOTTOM_MARGIN: i32 = 40;

/// Padding between the caption and the edge of its backing plate.
const PLATE_PADDING: i32 = 10;

/// Opacity of the black backing plate (0-255).
const PLATE_ALPHA: u8 = 180;

const CAPTION_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// DejaVu Sans, used when none of the configured fonts can be loaded.
static BUILTIN_FONT: &[u8] = include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/fonts/DejaVuSans.ttf"));

/// An encoded portrait.
#[derive(Debug, Clone)]
pub struct RenderedPortrait {
    /// JPEG bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Renders captioned portraits with a font chosen once at startup.
pub struct PortraitRenderer {
    font: FontVec,
    font_size: f32,
}

impl PortraitRenderer {
    pub fn new(font: FontVec, font_size: f32) -> Self {
        Self { font, font_size }
    }

    /// Renderer using the font compiled into the binary.
    pub fn with_builtin_font(font_size: f32) -> Result<Self, PortraitError> {
        Ok(Self::new(builtin_font()?, font_size))
    }

    /// Load the first usable font from the configured list, or the built-in one.
    pub fn from_config(config: &CaptionConfig) -> Result<Self, PortraitError> {
        Ok(Self::new(load_caption_font(&config.font_paths)?, config.font_size))
    }

    /// Crop `source` to `region`, scale to `OUTPUT_SIZE` square, caption and encode.
    pub fn render(&self, source: &DynamicImage, region: CropRegion, caption: &str) -> Result<RenderedPortrait, PortraitError> {
        if region.is_empty() {
            return Err(PortraitError::EmptyCrop {
                left: region.left,
                top: region.top,
                right: region.right,
                bottom: region.bottom,
            });
        }

        let cropped = source.crop_imm(region.left, region.top, region.width(), region.height());
        debug!(width = cropped.width(), height = cropped.height(), "Cropped source image");

        let resized = cropped.resize_exact(OUTPUT_SIZE, OUTPUT_SIZE, FilterType::Lanczos3);
        let mut canvas = flatten_alpha(&resized);

        draw_caption(&mut canvas, &self.font, self.font_size, caption);

        let data = encode_jpeg(&canvas)?;
        info!(bytes = data.len(), "Rendered portrait");

        Ok(RenderedPortrait {
            data,
            width: canvas.width(),
            height: canvas.height(),
        })
    }
}

/// Try each path in order and return the first font that parses, else the built-in font.
pub fn load_caption_font(paths: &[PathBuf]) -> Result<FontVec, PortraitError> {
    for path in paths {
        if let Ok(font_data) = std::fs::read(path)
            && let Ok(font) = FontVec::try_from_vec(font_data)
        {
            info!("Loaded caption font: {}", path.display());
            return Ok(font);
        }
    }

    warn!("None of the configured caption fonts could be loaded, using the built-in font");
    builtin_font()
}

pub fn builtin_font() -> Result<FontVec, PortraitError> {
    FontVec::try_from_vec(BUILTIN_FONT.to_vec()).map_err(|e| PortraitError::Font(e.to_string()))
}

/// Composite onto a white background, dropping any alpha channel.
fn flatten_alpha(image: &DynamicImage) -> RgbImage {
    let rgba: RgbaImage = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = f32::from(a) / 255.0;
        let over_white = |c: u8| (f32::from(c) * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        rgb.put_pixel(x, y, Rgb([over_white(r), over_white(g), over_white(b)]));
    }

    rgb
}

/// Draw `caption` centered near the bottom edge on a translucent black plate.
fn draw_caption(canvas: &mut RgbImage, font: &FontVec, font_size: f32, caption: &str) {
    let (text_width, text_height) = text_size(font_size, font, caption);
    let (text_width, text_height) = (text_width as i32, text_height as i32);
    let (canvas_width, canvas_height) = (canvas.width() as i32, canvas.height() as i32);

    let text_x = (canvas_width - text_width) / 2;
    let text_y = canvas_height - CAPTION_BOTTOM_MARGIN - text_height;

    darken_rect(
        canvas,
        text_x - PLATE_PADDING,
        text_y - PLATE_PADDING,
        text_x + text_width + PLATE_PADDING,
        text_y + text_height + PLATE_PADDING,
        PLATE_ALPHA,
    );
    draw_text_mut(canvas, CAPTION_COLOR, text_x, text_y, font_size, font, caption);
}

/// Blend black over the rectangle `[left, right) x [top, bottom)` at `alpha` opacity.
fn darken_rect(canvas: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, alpha: u8) {
    let (width, height) = (canvas.width() as i32, canvas.height() as i32);
    let keep = 1.0 - f32::from(alpha) / 255.0;

    for y in top.max(0)..bottom.min(height) {
        for x in left.max(0)..right.min(width) {
            let pixel = canvas.get_pixel_mut(x as u32, y as u32);
            for channel in pixel.0.iter_mut() {
                *channel = (f32::from(*channel) * keep).round() as u8;
            }
        }
    }
}

/// Baseline JPEG at `JPEG_QUALITY`, tagged as 300 DPI.
fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, PortraitError> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    encoder.set_pixel_density(PixelDensity::dpi(OUTPUT_DPI));
    encoder
        .write_image(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::Rgb8)
        .map_err(|e| PortraitError::Encode(e.to_string()))?;
    Ok(buffer)
}

//! Fixtures and app builders shared by the integration tests.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use axum_test::TestServer;
use image::{ImageFormat, Rgb, RgbImage};
use sqlx::PgPool;
use tempfile::TempDir;

use crate::config::Config;
use crate::portrait::{Detection, FaceDetector};

/// Reports one face in the middle of any image that is not a single flat colour.
///
/// Stands in for the model-backed detector, whose weights are not shipped with the crate.
pub struct StubDetector;

impl FaceDetector for StubDetector {
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<Detection> {
        let Some(&first) = gray.first() else {
            return Vec::new();
        };
        if gray.iter().all(|&p| p == first) {
            return Vec::new();
        }

        let side = width.min(height) / 3;
        vec![Detection {
            x: ((width - side) / 2) as i32,
            y: ((height - side) / 2) as i32,
            width: side,
            height: side,
            score: 10.0,
        }]
    }
}

pub fn create_test_config(uploads_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.local.directory = uploads_dir.to_path_buf();
    config.portrait.caption.font_paths = Vec::new();
    config.database.pool.max_connections = 2;
    config
}

/// Build the full router on top of a `#[sqlx::test]` pool, storing uploads in a fresh temp dir.
///
/// Keep the returned [`TempDir`] alive for the duration of the test.
pub async fn create_test_app(pool: PgPool) -> (TestServer, TempDir) {
    let uploads = tempfile::tempdir().expect("Failed to create uploads dir");
    let config = create_test_config(uploads.path());

    let app = crate::Application::new_with(config, pool, Arc::new(StubDetector))
        .await
        .expect("Failed to create application");

    (app.into_test_server(), uploads)
}

/// PNG of a single flat colour; the stub detector finds no face in it.
pub fn solid_png(width: u32, height: u32) -> Vec<u8> {
    encode_png(&RgbImage::from_pixel(width, height, Rgb([200, 180, 160])))
}

/// PNG with a smooth gradient; the stub detector finds a face in it.
pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
    });
    encode_png(&image)
}

fn encode_png(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("Failed to encode PNG");
    bytes
}

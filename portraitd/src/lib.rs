//! # portraitd: portrait photo service
//!
//! `portraitd` turns an arbitrary photo of a person into a standardized portrait. A client uploads
//! a JPEG or PNG together with a name; the service finds the most prominent face, plans a square
//! crop around it, renders a 600x600 JPEG with the name as a caption near the bottom edge, stores
//! the result, and records metadata about it in PostgreSQL.
//!
//! ## Request Flow
//!
//! `POST /process` validates the multipart form (content type, size, name, optional email), then
//! hands the bytes to the [`portrait::PortraitPipeline`]. Decoding, face location, cropping,
//! captioning and JPEG encoding are CPU bound and run on the blocking thread pool. The rendered
//! portrait goes to the configured [`storage::StorageSink`]: a local uploads directory, or an
//! S3-compatible bucket. Only once the write succeeds is a row inserted into the `portraits` table.
//!
//! Stored portraits can be listed with `GET /photos` (newest first, optionally filtered by email)
//! and, for local storage, fetched with `GET /download/{filename}` or browsed under `/uploads`.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). Every handler receives a cloned
//! [`AppState`] holding the database pool, configuration, the portrait pipeline (with its face
//! detector loaded once at startup) and the storage sink. There is no other shared state.
//!
//! Face detection sits behind the [`portrait::FaceDetector`] trait. Production uses the SeetaFace
//! detector from `rustface`, whose model file is read from `face_detection.model_path`.
//!
//! ## Observability
//!
//! Logging and tracing go through `tracing` (see [`telemetry`]). With `enable_metrics`, Prometheus
//! metrics for HTTP traffic, processed portraits and pipeline duration are served at
//! `/internal/metrics`. Interactive API documentation is served at `/docs`.

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod portrait;
pub mod storage;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{self, HeaderValue, Method};
use axum::{
    Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::config::CorsOrigin;
use crate::openapi::ApiDoc;
use crate::portrait::{FaceDetector, PortraitPipeline, PortraitRenderer, RustfaceDetector};
use crate::storage::{LocalStorage, StorageSink};

pub use types::{PortraitId, StorageMode};

/// Room for multipart boundaries and the text fields on top of the file size limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// # Fields
///
/// - `db`: PostgreSQL connection pool holding the `portraits` table
/// - `config`: Application configuration loaded from file and environment
/// - `pipeline`: Face location, crop planning and rendering
/// - `storage`: Where rendered portraits are written (local directory or remote bucket)
/// - `uploads`: The local uploads directory, used for downloads regardless of storage mode
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub pipeline: PortraitPipeline,
    pub storage: Arc<dyn StorageSink>,
    pub uploads: LocalStorage,
}

/// Get the portraitd database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect to PostgreSQL and run pending migrations.
#[instrument(skip_all)]
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    migrator().run(&pool).await.context("Failed to run database migrations")?;
    info!("Database ready");

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;

    let allow_origin = if cors_config.allowed_origins.contains(&CorsOrigin::Wildcard) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([http::header::CONTENT_TYPE, http::header::ACCEPT, http::header::AUTHORIZATION])
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers([http::header::CONTENT_DISPOSITION]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// - API routes (`/process`, `/photos`, `/download/{filename}`, `/health`)
/// - Static view of the uploads directory at `/uploads`
/// - API reference at `/docs`
/// - Optional Prometheus metrics at `/internal/metrics`
/// - CORS and request tracing
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let body_limit = state.config.limits.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let api_routes = Router::new()
        .route("/process", post(api::handlers::process::process_photo))
        .route("/photos", get(api::handlers::photos::list_photos))
        .route("/download/{filename}", get(api::handlers::download::download_photo))
        .route("/health", get(api::handlers::health::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state.clone());

    let router = Router::new()
        .merge(api_routes)
        .nest_service("/uploads", ServeDir::new(state.uploads.base_path()))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The assembled service: router, state and the resources it owns.
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Connect to the database, load the face model and build the router.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting portraitd with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        let detector = RustfaceDetector::load(&config.face_detection).context("Failed to load face detection model")?;

        Self::new_with(config, pool, Arc::new(detector)).await
    }

    /// Build the application on an existing pool and face detector.
    pub async fn new_with(config: Config, pool: PgPool, detector: Arc<dyn FaceDetector>) -> anyhow::Result<Self> {
        let storage = storage::create_storage(&config.storage).await?;
        let uploads = LocalStorage::create(config.storage.local.directory.clone())
            .await
            .context("Failed to create uploads directory")?;

        let renderer = PortraitRenderer::from_config(&config.portrait.caption).context("Failed to load caption font")?;
        let pipeline = PortraitPipeline::new(detector, Arc::new(renderer));

        info!(
            mode = %storage.mode(),
            available = storage.is_available(),
            uploads = %uploads.base_path().display(),
            "Storage configured"
        );

        let app_state = AppState::builder()
            .db(pool.clone())
            .config(config.clone())
            .pipeline(pipeline)
            .storage(storage)
            .uploads(uploads)
            .build();

        let router = build_router(&app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "portraitd listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::models::{
        health::HealthResponse,
        portraits::{PhotoListResponse, ProcessResponse},
    };
    use crate::errors::ErrorResponse;
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};

    fn upload_form(image: Vec<u8>, mime: &str, name: &str) -> MultipartForm {
        MultipartForm::new()
            .add_part("file", Part::bytes(image).file_name("selfie.png").mime_type(mime))
            .add_text("name", name)
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_process_stores_and_lists_portrait(pool: PgPool) {
        let (server, _uploads) = create_test_app(pool).await;

        let form = upload_form(gradient_png(800, 600), "image/png", "Ada Lovelace").add_text("email", "ada@example.com");
        let response = server.post("/process").multipart(form).await;
        response.assert_status_ok();

        let body: ProcessResponse = response.json();
        assert!(body.success);
        assert_eq!(body.mode, StorageMode::Local);
        assert!(body.filename.starts_with("passport_photo_ada_lovelace_"));
        assert!(body.filename.ends_with(".jpg"));
        assert_eq!(body.download_url.as_deref(), Some(format!("/download/{}", body.filename).as_str()));
        assert!(body.remote_file_id.is_none());
        assert_eq!(body.message, "Photo saved successfully!");

        let listed: PhotoListResponse = server.get("/photos").await.json();
        assert_eq!(listed.count, 1);
        assert_eq!(listed.photos[0].id, body.metadata_id);
        assert_eq!(listed.photos[0].name_on_photo, "Ada Lovelace");
        assert_eq!(listed.photos[0].user_email.as_deref(), Some("ada@example.com"));
        assert_eq!(listed.photos[0].image_dimensions, "600x600");
        assert_eq!(listed.photos[0].original_filename, "selfie.png");

        let download = server.get(&format!("/download/{}", body.filename)).await;
        download.assert_status_ok();
        assert_eq!(download.header("content-type"), "image/jpeg");
        assert!(
            download
                .header("content-disposition")
                .to_str()
                .unwrap()
                .starts_with("attachment")
        );
        let portrait = image::load_from_memory(download.as_bytes()).unwrap();
        assert_eq!((portrait.width(), portrait.height()), (600, 600));

        server.get(&format!("/uploads/{}", body.filename)).await.assert_status_ok();
    }

    #[sqlx::test]
    async fn test_photos_newest_first_and_filtered(pool: PgPool) {
        let (server, _uploads) = create_test_app(pool).await;

        for (name, email) in [("Ada", "ada@example.com"), ("Grace", "grace@example.com")] {
            let form = upload_form(gradient_png(400, 400), "image/png", name).add_text("email", email);
            server.post("/process").multipart(form).await.assert_status_ok();
        }

        let listed: PhotoListResponse = server.get("/photos").await.json();
        let names: Vec<_> = listed.photos.iter().map(|p| p.name_on_photo.as_str()).collect();
        assert_eq!(names, vec!["Grace", "Ada"]);

        let filtered: PhotoListResponse = server.get("/photos").add_query_param("email", "ada@example.com").await.json();
        assert_eq!(filtered.count, 1);
        assert_eq!(filtered.photos[0].name_on_photo, "Ada");

        let limited: PhotoListResponse = server.get("/photos").add_query_param("limit", 1).await.json();
        assert_eq!(limited.count, 1);
        assert_eq!(limited.photos[0].name_on_photo, "Grace");
    }

    #[sqlx::test]
    async fn test_solid_image_has_no_face(pool: PgPool) {
        let (server, _uploads) = create_test_app(pool).await;

        let response = server
            .post("/process")
            .multipart(upload_form(solid_png(300, 300), "image/png", "Ada"))
            .await;
        response.assert_status_bad_request();
        let body: ErrorResponse = response.json();
        assert!(!body.success);
        assert_eq!(body.code, "NO_FACE_DETECTED");

        let listed: PhotoListResponse = server.get("/photos").await.json();
        assert_eq!(listed.count, 0);
    }

    #[sqlx::test]
    async fn test_name_validation(pool: PgPool) {
        let (server, _uploads) = create_test_app(pool).await;

        for bad in ["ada@home", "#1", "hello!", &"a".repeat(51), ""] {
            let response = server
                .post("/process")
                .multipart(upload_form(gradient_png(300, 300), "image/png", bad))
                .await;
            response.assert_status_bad_request();
            let body: ErrorResponse = response.json();
            assert_eq!(body.code, "VALIDATION_ERROR", "{bad:?}");
        }

        let response = server
            .post("/process")
            .multipart(upload_form(gradient_png(300, 300), "image/png", &"a".repeat(50)))
            .await;
        response.assert_status_ok();

        let response = server
            .post("/process")
            .multipart(upload_form(gradient_png(300, 300), "image/png", "   "))
            .await;
        response.assert_status_ok();
        let processed: ProcessResponse = response.json();
        assert!(processed.filename.starts_with("passport_photo____"));
    }

    #[sqlx::test]
    async fn test_missing_fields(pool: PgPool) {
        let (server, _uploads) = create_test_app(pool).await;

        let response = server
            .post("/process")
            .multipart(MultipartForm::new().add_text("name", "Ada"))
            .await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<ErrorResponse>().code, "MISSING_FIELD");

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(gradient_png(300, 300)).file_name("a.png").mime_type("image/png"),
        );
        let response = server.post("/process").multipart(form).await;
        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[sqlx::test]
    async fn test_rejects_unsupported_uploads(pool: PgPool) {
        let (server, _uploads) = create_test_app(pool).await;

        let response = server
            .post("/process")
            .multipart(upload_form(b"%PDF-1.7".to_vec(), "application/pdf", "Ada"))
            .await;
        response.assert_status_bad_request();
        assert_eq!(response.json::<ErrorResponse>().error, "Invalid file type. Please upload an image.");

        let response = server
            .post("/process")
            .multipart(upload_form(b"GIF89a".to_vec(), "image/gif", "Ada"))
            .await;
        response.assert_status_bad_request();
        assert_eq!(response.json::<ErrorResponse>().error, "Only JPG and PNG formats are supported.");

        let response = server
            .post("/process")
            .multipart(upload_form(Vec::new(), "image/png", "Ada"))
            .await;
        response.assert_status_bad_request();
    }

    #[sqlx::test]
    async fn test_undecodable_image_is_server_error(pool: PgPool) {
        let (server, _uploads) = create_test_app(pool).await;

        let response = server
            .post("/process")
            .multipart(upload_form(b"definitely not a png".to_vec(), "image/png", "Ada"))
            .await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.json::<ErrorResponse>().code, "PROCESSING_FAILED");
    }

    #[sqlx::test]
    async fn test_oversized_upload_rejected(pool: PgPool) {
        let uploads = tempfile::tempdir().unwrap();
        let mut config = create_test_config(uploads.path());
        config.limits.max_upload_bytes = 4096;
        let server = Application::new_with(config, pool, Arc::new(StubDetector))
            .await
            .unwrap()
            .into_test_server();

        let response = server
            .post("/process")
            .multipart(upload_form(vec![0u8; 4097], "image/png", "Ada"))
            .await;
        response.assert_status_bad_request();
        let body = response.json::<ErrorResponse>();
        assert_eq!(body.code, "VALIDATION_ERROR");
        assert_eq!(body.error, "File size exceeds 4KB limit.");
    }

    #[tokio::test]
    async fn test_failed_insert_removes_stored_portrait() {
        let uploads = tempfile::tempdir().unwrap();
        let config = create_test_config(uploads.path());
        let unreachable = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_secs(1))
            .connect_lazy("postgres://portraitd@127.0.0.1:1/portraitd")
            .unwrap();
        let server = Application::new_with(config, unreachable, Arc::new(StubDetector))
            .await
            .unwrap()
            .into_test_server();

        let response = server
            .post("/process")
            .multipart(upload_form(gradient_png(300, 300), "image/png", "Ada"))
            .await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.json::<ErrorResponse>().code, "DATABASE_ERROR");

        let left: Vec<_> = std::fs::read_dir(uploads.path()).unwrap().collect();
        assert!(left.is_empty(), "{left:?}");
    }

    #[sqlx::test]
    async fn test_download_rejects_missing_and_unsafe_names(pool: PgPool) {
        let (server, _uploads) = create_test_app(pool).await;

        server.get("/download/nope.jpg").await.assert_status_not_found();
        server.get("/download/..%2Fsecrets.txt").await.assert_status_not_found();
    }

    #[sqlx::test]
    async fn test_health_local_mode(pool: PgPool) {
        let (server, _uploads) = create_test_app(pool).await;

        let response = server.get("/health").await;
        response.assert_status_ok();
        let health: HealthResponse = response.json();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.database, "connected");
        assert_eq!(health.remote_storage, "disabled");
        assert_eq!(health.storage_mode, StorageMode::Local);
    }

    #[sqlx::test]
    async fn test_unconfigured_remote_storage(pool: PgPool) {
        let uploads = tempfile::tempdir().unwrap();
        let mut config = create_test_config(uploads.path());
        config.storage.mode = StorageMode::Remote;
        config.storage.remote = None;
        let server = Application::new_with(config, pool, Arc::new(StubDetector))
            .await
            .unwrap()
            .into_test_server();

        let health: HealthResponse = server.get("/health").await.json();
        assert_eq!(health.remote_storage, "disabled");
        assert_eq!(health.storage_mode, StorageMode::Remote);

        let response = server
            .post("/process")
            .multipart(upload_form(gradient_png(300, 300), "image/png", "Ada"))
            .await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.json::<ErrorResponse>().code, "STORAGE_UNAVAILABLE");

        let listed: PhotoListResponse = server.get("/photos").await.json();
        assert_eq!(listed.count, 0);
    }

    #[sqlx::test]
    async fn test_docs_served(pool: PgPool) {
        let (server, _uploads) = create_test_app(pool).await;
        server.get("/docs").await.assert_status_ok();
    }

    #[sqlx::test]
    async fn test_build_router_with_metrics_disabled(pool: PgPool) {
        let (server, _uploads) = create_test_app(pool).await;
        server.get("/internal/metrics").await.assert_status_not_found();
    }

    #[sqlx::test]
    async fn test_build_router_with_metrics_enabled(pool: PgPool) {
        let uploads = tempfile::tempdir().unwrap();
        let mut config = create_test_config(uploads.path());
        config.enable_metrics = true;
        let server = Application::new_with(config, pool, Arc::new(StubDetector))
            .await
            .unwrap()
            .into_test_server();

        server.get("/health").await.assert_status_ok();

        let metrics_response = server.get("/internal/metrics").await;
        metrics_response.assert_status_ok();
        let metrics_content = metrics_response.text();
        assert!(metrics_content.contains("# HELP") || metrics_content.contains("# TYPE"));
    }

    #[test]
    fn test_cors_layer_accepts_wildcard_and_urls() {
        let mut config = Config::default();
        assert!(create_cors_layer(&config).is_ok());

        config.cors.allowed_origins = crate::config::parse_origin_list("https://app.example.com,https://admin.example.com").unwrap();
        config.cors.allow_credentials = true;
        assert!(create_cors_layer(&config).is_ok());
    }
}

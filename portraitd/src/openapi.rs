//! OpenAPI documentation for the portrait API, served at `/docs`.

use utoipa::OpenApi;

use crate::{api, errors::ErrorResponse, types::StorageMode};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "portraitd",
        description = "Upload a photo and a name; receive a face-centred 600x600 portrait with the name as caption."
    ),
    paths(
        api::handlers::process::process_photo,
        api::handlers::photos::list_photos,
        api::handlers::download::download_photo,
        api::handlers::health::health,
    ),
    components(
        schemas(
            api::models::portraits::ProcessResponse,
            api::models::portraits::PortraitResponse,
            api::models::portraits::PhotoListResponse,
            api::models::health::HealthResponse,
            ErrorResponse,
            StorageMode,
        )
    ),
    tags(
        (name = "portraits", description = "Portrait processing, listing and download"),
        (name = "health", description = "Service status"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lists_every_route() {
        let spec = ApiDoc::openapi();
        let paths: Vec<_> = spec.paths.paths.keys().map(String::as_str).collect();
        for expected in ["/process", "/photos", "/download/{filename}", "/health"] {
            assert!(paths.contains(&expected), "missing {expected} in {paths:?}");
        }
    }
}

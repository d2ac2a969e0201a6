//! `GET /download/{filename}`: serve a locally stored portrait as an attachment.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};

use crate::{AppState, errors::Result};

#[utoipa::path(
    get,
    path = "/download/{filename}",
    tag = "portraits",
    summary = "Download photo",
    description = "Streams a portrait from the local uploads directory with an attachment disposition.",
    responses(
        (status = 200, description = "JPEG portrait", content_type = "image/jpeg"),
        (status = 404, description = "File not found", body = crate::errors::ErrorResponse)
    ),
    params(
        ("filename" = String, Path, description = "File name returned by `POST /process`")
    )
)]
pub async fn download_photo(State(state): State<AppState>, Path(filename): Path<String>) -> Result<impl IntoResponse> {
    let data = state.uploads.retrieve(&filename).await?;

    tracing::debug!(filename = %filename, bytes = data.len(), "Serving portrait download");

    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        data,
    ))
}

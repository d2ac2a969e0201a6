//! `GET /photos`: list recorded portraits.

use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    AppState,
    api::models::portraits::{ListPhotosQuery, PhotoListResponse, PortraitResponse},
    db::{
        handlers::{Portraits, Repository},
        models::portraits::PortraitFilter,
    },
    errors::{Error, Result},
};

#[utoipa::path(
    get,
    path = "/photos",
    tag = "portraits",
    summary = "List photos",
    description = "Returns recorded portraits, newest first, optionally filtered by the email given at upload.",
    responses(
        (status = 200, description = "Recorded portraits", body = PhotoListResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    params(
        ListPhotosQuery
    )
)]
pub async fn list_photos(
    State(state): State<AppState>,
    Query(query): Query<ListPhotosQuery>,
) -> Result<Json<PhotoListResponse>> {
    let max = state.config.limits.max_photos_listed;
    let limit = query.limit.unwrap_or(max).clamp(1, max);

    let mut filter = PortraitFilter::new(limit);
    if let Some(email) = query.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        filter = filter.with_user_email(email);
    }

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let portraits = Portraits::new(&mut pool_conn).list(&filter).await?;

    let photos: Vec<PortraitResponse> = portraits.into_iter().map(PortraitResponse::from).collect();

    Ok(Json(PhotoListResponse {
        success: true,
        count: photos.len(),
        photos,
    }))
}

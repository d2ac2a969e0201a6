//! `GET /health`

use axum::{Json, extract::State};

use crate::{AppState, api::models::health::HealthResponse, types::StorageMode};

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    summary = "Health check",
    description = "Reports database connectivity and which storage sink is active. Always returns 200.",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected",
        Err(e) => {
            tracing::warn!("Health check database query failed: {e}");
            "disconnected"
        }
    };

    let mode = state.storage.mode();
    let remote_storage = if mode == StorageMode::Remote && state.storage.is_available() {
        "enabled"
    } else {
        "disabled"
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        database: database.to_string(),
        remote_storage: remote_storage.to_string(),
        storage_mode: mode,
    })
}

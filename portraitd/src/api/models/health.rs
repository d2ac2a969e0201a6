use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::StorageMode;

/// Service health report. Always returned with status 200.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `healthy` when the process is serving requests
    pub status: String,
    /// `connected` or `disconnected`
    pub database: String,
    /// `enabled` when uploads go to a working remote sink, otherwise `disabled`
    pub remote_storage: String,
    pub storage_mode: StorageMode,
}

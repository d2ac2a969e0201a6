//! API request/response models for portraits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::portraits::PortraitDBResponse;
use crate::types::{PortraitId, StorageMode};

/// Result of a successful `POST /process`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub success: bool,
    /// Storage sink that received the portrait
    pub mode: StorageMode,
    /// Local path or remote object key
    pub storage_ref: String,
    /// Remote object key (remote mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_file_id: Option<String>,
    /// Link to fetch the portrait
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Generated file name
    pub filename: String,
    /// ID of the metadata record
    #[schema(value_type = String, format = "uuid")]
    pub metadata_id: PortraitId,
    pub message: String,
}

/// Query parameters for `GET /photos`
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListPhotosQuery {
    /// Only return portraits uploaded with this email
    pub email: Option<String>,

    /// Maximum number of portraits to return (1-100, default 100)
    #[param(default = 100, minimum = 1, maximum = 100)]
    pub limit: Option<i64>,
}

/// A recorded portrait
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortraitResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PortraitId,
    pub filename: String,
    pub storage_mode: StorageMode,
    pub storage_ref: String,
    pub remote_file_id: Option<String>,
    pub download_url: Option<String>,
    pub name_on_photo: String,
    pub original_filename: String,
    pub user_email: Option<String>,
    pub file_size_bytes: i64,
    /// Output size as `WIDTHxHEIGHT`
    pub image_dimensions: String,
    pub processing_status: String,
    pub created_at: DateTime<Utc>,
}

impl From<PortraitDBResponse> for PortraitResponse {
    fn from(db: PortraitDBResponse) -> Self {
        Self {
            id: db.id,
            filename: db.filename,
            // constrained to 'remote' | 'local' by the table definition
            storage_mode: db.storage_mode.parse().unwrap_or_default(),
            storage_ref: db.storage_ref,
            remote_file_id: db.remote_file_id,
            download_url: db.download_url,
            name_on_photo: db.name_on_photo,
            original_filename: db.original_filename,
            user_email: db.user_email,
            file_size_bytes: db.file_size_bytes,
            image_dimensions: format!("{}x{}", db.output_width, db.output_height),
            processing_status: db.processing_status,
            created_at: db.created_at,
        }
    }
}

/// Result of `GET /photos`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PhotoListResponse {
    pub success: bool,
    pub photos: Vec<PortraitResponse>,
    pub count: usize,
}

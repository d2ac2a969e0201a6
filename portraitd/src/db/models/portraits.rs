//! Database models for processed portraits.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{PortraitId, StorageMode};

/// Database request for recording a processed portrait
#[derive(Debug, Clone)]
pub struct PortraitCreateDBRequest {
    pub filename: String,
    pub storage_mode: StorageMode,
    pub storage_ref: String,
    pub remote_file_id: Option<String>,
    pub download_url: Option<String>,
    pub name_on_photo: String,
    pub original_filename: String,
    pub user_email: Option<String>,
    pub file_size_bytes: i64,
    pub output_width: i32,
    pub output_height: i32,
}

/// Database response for a portrait record
#[derive(Debug, Clone, FromRow)]
pub struct PortraitDBResponse {
    pub id: PortraitId,
    pub filename: String,
    pub storage_mode: String,
    pub storage_ref: String,
    pub remote_file_id: Option<String>,
    pub download_url: Option<String>,
    pub name_on_photo: String,
    pub original_filename: String,
    pub user_email: Option<String>,
    pub file_size_bytes: i64,
    pub output_width: i32,
    pub output_height: i32,
    pub processing_status: String,
    pub created_at: DateTime<Utc>,
}

/// Filter for listing portraits
#[derive(Debug, Clone)]
pub struct PortraitFilter {
    pub user_email: Option<String>,
    pub limit: i64,
}

impl PortraitFilter {
    pub fn new(limit: i64) -> Self {
        Self { user_email: None, limit }
    }

    pub fn with_user_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }
}

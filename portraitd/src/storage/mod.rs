//! Storage sinks for rendered portraits.
//!
//! A sink persists the JPEG bytes and hands back a reference the caller can record and return to
//! the client. Two backends exist:
//!
//! - [`LocalStorage`]: files in the configured uploads directory, served back via `/download`
//! - [`S3Storage`]: objects in an S3-compatible bucket under a key prefix
//!
//! When remote storage is selected but cannot be set up (missing bucket, unreadable credential
//! file), [`UnavailableStorage`] stands in so the service still starts and `/health` can report it.

pub mod local;
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::types::StorageMode;

pub use local::LocalStorage;
pub use s3::S3Storage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("remote storage is not configured: {0}")]
    NotConfigured(String),

    #[error("file not found")]
    NotFound,

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("removal failed: {0}")]
    Remove(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// A rendered portrait on its way to storage.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub data: Vec<u8>,
    /// Generated output file name, e.g. `passport_photo_ada_1700000000.jpg`
    pub filename: String,
    /// Name of the file as uploaded by the client
    pub original_filename: String,
}

/// Where a portrait ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Local path or remote object key
    pub storage_ref: String,
    /// Remote object key (remote mode only)
    pub remote_file_id: Option<String>,
    /// Link the client can use to fetch the portrait
    pub download_url: Option<String>,
}

#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Persist a rendered portrait.
    async fn store(&self, request: StoreRequest) -> Result<StoredObject>;

    /// Delete a portrait written by [`StorageSink::store`]. Removing an object that is already gone succeeds.
    async fn remove(&self, object: &StoredObject) -> Result<()>;

    fn mode(&self) -> StorageMode;

    /// Whether the sink is able to accept uploads.
    fn is_available(&self) -> bool {
        true
    }
}

/// Placeholder for a remote sink that could not be configured. Every upload fails.
pub struct UnavailableStorage {
    reason: String,
}

impl UnavailableStorage {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl StorageSink for UnavailableStorage {
    async fn store(&self, _request: StoreRequest) -> Result<StoredObject> {
        Err(StorageError::NotConfigured(self.reason.clone()))
    }

    async fn remove(&self, _object: &StoredObject) -> Result<()> {
        Ok(())
    }

    fn mode(&self) -> StorageMode {
        StorageMode::Remote
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// True if `name` is a bare file name with no directory components.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && !name.contains(['/', '\\']) && !name.contains("..") && !name.contains('\0')
}

/// Create the storage sink selected by `config.mode`.
///
/// Local storage failing to initialise is fatal. Remote storage failing to initialise is logged and
/// replaced with [`UnavailableStorage`].
pub async fn create_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn StorageSink>> {
    match config.mode {
        StorageMode::Local => {
            info!(path = %config.local.directory.display(), "Creating local storage sink");
            let storage = LocalStorage::create(config.local.directory.clone()).await?;
            Ok(Arc::new(storage))
        }
        StorageMode::Remote => {
            let Some(remote) = &config.remote else {
                warn!("Storage mode is remote but no remote storage is configured, uploads will fail");
                return Ok(Arc::new(UnavailableStorage::new("no remote storage section in configuration")));
            };

            match S3Storage::new(remote).await {
                Ok(storage) => {
                    info!(bucket = %remote.bucket, prefix = %remote.prefix, "Creating remote storage sink");
                    Ok(Arc::new(storage))
                }
                Err(e) => {
                    warn!("Remote storage could not be initialised, uploads will fail: {}", e);
                    Ok(Arc::new(UnavailableStorage::new(e.to_string())))
                }
            }
        }
    }
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::{Result, StorageError, StorageSink, StoreRequest, StoredObject, is_plain_file_name};
use crate::types::StorageMode;

/// Stores portraits as files in a single directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Create the directory if needed and return a sink rooted in it.
    pub async fn create(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path).await?;
        Ok(Self::new(base_path))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// URL the client uses to fetch a stored file.
    pub fn download_url(filename: &str) -> String {
        format!("/download/{filename}")
    }

    /// Resolve `filename` inside the directory, rejecting anything that is not a bare file name.
    pub fn path_for(&self, filename: &str) -> Result<PathBuf> {
        if !is_plain_file_name(filename) {
            return Err(StorageError::InvalidName(filename.to_string()));
        }
        Ok(self.base_path.join(filename))
    }

    /// Read a stored file back.
    pub async fn retrieve(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.path_for(filename)?;
        match fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl StorageSink for LocalStorage {
    #[instrument(skip(self, request), fields(filename = %request.filename, bytes = request.data.len()))]
    async fn store(&self, request: StoreRequest) -> Result<StoredObject> {
        let path = self.path_for(&request.filename)?;

        let mut file = fs::File::create(&path).await?;
        file.write_all(&request.data).await?;
        file.sync_all().await?;

        debug!(path = %path.display(), "Saved portrait locally");

        Ok(StoredObject {
            storage_ref: path.to_string_lossy().into_owned(),
            remote_file_id: None,
            download_url: Some(Self::download_url(&request.filename)),
        })
    }

    #[instrument(skip(self, object), fields(storage_ref = %object.storage_ref))]
    async fn remove(&self, object: &StoredObject) -> Result<()> {
        let filename = Path::new(&object.storage_ref)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StorageError::InvalidName(object.storage_ref.clone()))?;
        let path = self.path_for(filename)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed local portrait");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn mode(&self) -> StorageMode {
        StorageMode::Local
    }
}

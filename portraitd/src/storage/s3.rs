use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use serde::Deserialize;
use tracing::{info, instrument};

use super::{Result, StorageError, StorageSink, StoreRequest, StoredObject};
use crate::config::RemoteStorageConfig;
use crate::types::StorageMode;

/// Static credentials read from the configured credential file.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    session_token: Option<String>,
}

/// Stores portraits as objects in an S3-compatible bucket.
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
    public_base_url: Option<String>,
    presign_expiry: Duration,
}

impl S3Storage {
    pub async fn new(config: &RemoteStorageConfig) -> Result<Self> {
        if config.bucket.trim().is_empty() {
            return Err(StorageError::NotConfigured("bucket name is empty".to_string()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let Some(path) = &config.credentials_file {
            loader = loader.credentials_provider(load_credentials_file(path).await?);
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint.as_str());
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
            public_base_url: config.public_base_url.clone(),
            presign_expiry: config.presign_expiry,
        })
    }

    /// Object key for `filename` under the configured prefix.
    pub fn object_key(&self, filename: &str) -> String {
        object_key(&self.prefix, filename)
    }

    /// Link a client can open to view the object.
    async fn viewable_link(&self, key: &str) -> Result<String> {
        if let Some(base) = &self.public_base_url {
            return Ok(public_link(base, key));
        }

        let presigning = PresigningConfig::expires_in(self.presign_expiry).map_err(|e| StorageError::Upload(e.to_string()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Upload(DisplayErrorContext(e).to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

#[async_trait]
impl StorageSink for S3Storage {
    #[instrument(skip(self, request), fields(bucket = %self.bucket, filename = %request.filename, bytes = request.data.len()))]
    async fn store(&self, request: StoreRequest) -> Result<StoredObject> {
        let key = self.object_key(&request.filename);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(request.data))
            .content_type("image/jpeg")
            .metadata("original-filename", &request.original_filename)
            .send()
            .await
            .map_err(|e| StorageError::Upload(DisplayErrorContext(e).to_string()))?;

        info!(key = %key, "Uploaded portrait to remote storage");

        let link = self.viewable_link(&key).await?;
        Ok(StoredObject {
            storage_ref: key.clone(),
            remote_file_id: Some(key),
            download_url: Some(link),
        })
    }

    #[instrument(skip(self, object), fields(bucket = %self.bucket, key = %object.storage_ref))]
    async fn remove(&self, object: &StoredObject) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&object.storage_ref)
            .send()
            .await
            .map_err(|e| StorageError::Remove(DisplayErrorContext(e).to_string()))?;

        info!(key = %object.storage_ref, "Removed portrait from remote storage");
        Ok(())
    }

    fn mode(&self) -> StorageMode {
        StorageMode::Remote
    }
}

fn object_key(prefix: &str, filename: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        filename.to_string()
    } else {
        format!("{prefix}/{filename}")
    }
}

fn public_link(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

async fn load_credentials_file(path: &Path) -> Result<Credentials> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| StorageError::NotConfigured(format!("cannot read credentials file {}: {e}", path.display())))?;
    let parsed: CredentialsFile = serde_json::from_slice(&raw)
        .map_err(|e| StorageError::NotConfigured(format!("invalid credentials file {}: {e}", path.display())))?;

    Ok(Credentials::new(
        parsed.access_key_id,
        parsed.secret_access_key,
        parsed.session_token,
        None,
        "portraitd-credentials-file",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_joins_prefix() {
        assert_eq!(object_key("passport-photos", "a.jpg"), "passport-photos/a.jpg");
        assert_eq!(object_key("/passport-photos/", "a.jpg"), "passport-photos/a.jpg");
        assert_eq!(object_key("", "a.jpg"), "a.jpg");
    }

    #[test]
    fn public_link_avoids_double_slash() {
        assert_eq!(
            public_link("https://cdn.example.com/", "photos/a.jpg"),
            "https://cdn.example.com/photos/a.jpg"
        );
    }

    #[tokio::test]
    async fn credentials_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"access_key_id": "AKIDEXAMPLE", "secret_access_key": "secret"}"#).unwrap();

        let creds = load_credentials_file(&path).await.unwrap();
        assert_eq!(creds.access_key_id(), "AKIDEXAMPLE");
        assert_eq!(creds.secret_access_key(), "secret");
        assert!(creds.session_token().is_none());
    }

    #[tokio::test]
    async fn malformed_credentials_file_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_credentials_file(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn empty_bucket_is_rejected() {
        let config = RemoteStorageConfig {
            bucket: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(S3Storage::new(&config).await, Err(StorageError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn client_uses_prefix_and_public_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"access_key_id": "a", "secret_access_key": "b", "session_token": "c"}"#).unwrap();

        let config = RemoteStorageConfig {
            bucket: "portraits".to_string(),
            prefix: "passport-photos".to_string(),
            endpoint_url: Some("http://localhost:9000".to_string()),
            public_base_url: Some("https://cdn.example.com".to_string()),
            credentials_file: Some(path),
            ..Default::default()
        };
        let storage = S3Storage::new(&config).await.unwrap();
        assert!(storage.is_available());
        assert_eq!(storage.object_key("x.jpg"), "passport-photos/x.jpg");
        assert_eq!(
            storage.viewable_link("passport-photos/x.jpg").await.unwrap(),
            "https://cdn.example.com/passport-photos/x.jpg"
        );
    }
}

//! Object-store client: an `async-trait` collaborator interface (spec §9)
//! with `HttpObjectStore` as the shipped S3-compatible implementation.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("failed to read local artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("upload request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upload rejected with status {0}")]
    Rejected(reqwest::StatusCode),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `local_path` to `remote_prefix` under the configured
    /// bucket, tagged with the given storage tier.
    async fn upload(
        &self,
        local_path: &Path,
        remote_prefix: &str,
        storage_tier: &str,
    ) -> Result<(), ObjectStoreError>;
}

/// A thin PUT-based client against an S3-compatible HTTP endpoint.
/// Bucket, region, and credentials are passed through opaquely via
/// configuration (spec §6) rather than modeled as a typed AWS client.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    bucket_name: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: String, bucket_name: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            bucket_name,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(
        &self,
        local_path: &Path,
        remote_prefix: &str,
        storage_tier: &str,
    ) -> Result<(), ObjectStoreError> {
        let basename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|source| ObjectStoreError::Io {
                path: local_path.display().to_string(),
                source,
            })?;

        let url = format!(
            "{}/{}/{}{}",
            self.endpoint.trim_end_matches('/'),
            self.bucket_name,
            remote_prefix,
            basename
        );

        let response = self
            .client
            .put(&url)
            .header("x-amz-storage-class", storage_tier)
            .body(bytes)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ObjectStoreError::Rejected(response.status()))
        }
    }
}

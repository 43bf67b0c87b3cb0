//! S3-compatible object storage (MinIO, R2, AWS).

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::{sanitize_filename, BlobReader};

/// Configuration for the object-store backend.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region ("us-east-1" works for most S3-compatible stores)
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("S3_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("S3_BUCKET_NAME not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        })
    }
}

/// Object-store blob backend. References are object keys
/// (`directory/filename`).
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Create a new client from configuration.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vproc",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
        })
    }

    pub async fn save_file(
        &self,
        path: &Path,
        directory: &str,
        filename: &str,
    ) -> StorageResult<String> {
        let key = object_key(directory, filename);
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type(content_type_for(filename))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(key)
    }

    pub async fn save_bytes(
        &self,
        data: Vec<u8>,
        directory: &str,
        filename: &str,
    ) -> StorageResult<String> {
        let key = object_key(directory, filename);
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .content_type(content_type_for(filename))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        Ok(key)
    }

    pub async fn read(&self, reference: &str) -> StorageResult<Vec<u8>> {
        let response = self.get_object(reference).await?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    pub async fn open_read(&self, reference: &str) -> StorageResult<BlobReader> {
        let response = self.get_object(reference).await?;
        Ok(BlobReader::Object(Box::pin(
            response.body.into_async_read(),
        )))
    }

    pub async fn download_to(&self, reference: &str, dest: &Path) -> StorageResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self.get_object(reference).await?;
        let mut reader = Box::pin(response.body.into_async_read());
        let mut file = tokio::fs::File::create(dest).await?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?;

        Ok(())
    }

    pub async fn delete(&self, reference: &str) -> StorageResult<bool> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(reference)
            .send()
            .await
        {
            Ok(_) => {
                debug!("Deleted object: {}", reference);
                Ok(true)
            }
            Err(e) => {
                warn!("Failed to delete object {}: {}", reference, e);
                Ok(false)
            }
        }
    }

    pub async fn exists(&self, reference: &str) -> StorageResult<bool> {
        Ok(self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(reference)
            .send()
            .await
            .is_ok())
    }

    pub async fn size(&self, reference: &str) -> StorageResult<Option<u64>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(reference)
            .send()
            .await
        {
            Ok(head) => Ok(head.content_length().map(|len| len as u64)),
            Err(_) => Ok(None),
        }
    }

    async fn get_object(
        &self,
        reference: &str,
    ) -> StorageResult<aws_sdk_s3::operation::get_object::GetObjectOutput> {
        self.client
            .get_object()
            .bucket(&self.bucket)
            .key(reference)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(reference)
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })
    }
}

fn object_key(directory: &str, filename: &str) -> String {
    let directory = directory.trim_matches('/');
    if directory.is_empty() {
        sanitize_filename(filename)
    } else {
        format!("{directory}/{}", sanitize_filename(filename))
    }
}

fn content_type_for(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.ends_with(".mp4") || lower.ends_with(".m4v") {
        "video/mp4"
    } else if lower.ends_with(".mov") {
        "video/quicktime"
    } else if lower.ends_with(".m4a") || lower.ends_with(".aac") {
        "audio/mp4"
    } else if lower.ends_with(".mp3") {
        "audio/mpeg"
    } else if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}

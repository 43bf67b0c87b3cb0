//! Blob storage for job inputs and outputs.
//!
//! Two backends behind one narrow contract: a local filesystem rooted at a
//! base path, and an S3-compatible object store (endpoint + credentials +
//! bucket). References are backend keys of the form `directory/filename`,
//! never absolute paths. The backend is selected once at startup; callers
//! only ever see [`BlobStore`].

pub mod error;
pub mod local;
pub mod s3;

pub use error::{StorageError, StorageResult};
pub use local::LocalBlobStore;
pub use s3::{S3BlobStore, S3Config};

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// A readable stream over a stored blob.
pub enum BlobReader {
    /// Direct file handle (local backend)
    File(tokio::fs::File),
    /// Streaming object body (object-store backend)
    Object(Pin<Box<dyn AsyncRead + Send>>),
}

impl AsyncRead for BlobReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            BlobReader::File(file) => Pin::new(file).poll_read(cx, buf),
            BlobReader::Object(reader) => reader.as_mut().poll_read(cx, buf),
        }
    }
}

/// Content storage keyed by `directory/filename` references.
#[derive(Debug, Clone)]
pub enum BlobStore {
    Local(LocalBlobStore),
    S3(S3BlobStore),
}

impl BlobStore {
    /// Filesystem backend rooted at `base`.
    pub fn local(base: impl Into<PathBuf>) -> Self {
        Self::Local(LocalBlobStore::new(base))
    }

    /// Object-store backend over an existing client.
    pub fn s3(store: S3BlobStore) -> Self {
        Self::S3(store)
    }

    /// Select and build the backend from the environment.
    ///
    /// `BLOB_STORE_PROVIDER` is `local` (default, rooted at
    /// `BLOB_STORE_BASE_PATH`) or `s3` (see [`S3Config::from_env`]).
    pub async fn from_env() -> StorageResult<Self> {
        let provider =
            std::env::var("BLOB_STORE_PROVIDER").unwrap_or_else(|_| "local".to_string());

        match provider.to_lowercase().as_str() {
            "local" => {
                let base = std::env::var("BLOB_STORE_BASE_PATH")
                    .unwrap_or_else(|_| "./data".to_string());
                Ok(Self::local(base))
            }
            "s3" => {
                let config = S3Config::from_env()?;
                Ok(Self::S3(S3BlobStore::new(config).await?))
            }
            other => Err(StorageError::config_error(format!(
                "Unknown blob store provider: {other}"
            ))),
        }
    }

    /// Store a local file under `directory`, returning its reference.
    pub async fn save_file(
        &self,
        path: &Path,
        directory: &str,
        filename: &str,
    ) -> StorageResult<String> {
        match self {
            Self::Local(store) => store.save_file(path, directory, filename).await,
            Self::S3(store) => store.save_file(path, directory, filename).await,
        }
    }

    /// Store raw bytes under `directory`, returning their reference.
    pub async fn save_bytes(
        &self,
        data: Vec<u8>,
        directory: &str,
        filename: &str,
    ) -> StorageResult<String> {
        match self {
            Self::Local(store) => store.save_bytes(data, directory, filename).await,
            Self::S3(store) => store.save_bytes(data, directory, filename).await,
        }
    }

    /// Read a whole blob into memory.
    pub async fn read(&self, reference: &str) -> StorageResult<Vec<u8>> {
        match self {
            Self::Local(store) => store.read(reference).await,
            Self::S3(store) => store.read(reference).await,
        }
    }

    /// Open a blob for streaming reads.
    pub async fn open_read(&self, reference: &str) -> StorageResult<BlobReader> {
        match self {
            Self::Local(store) => store.open_read(reference).await,
            Self::S3(store) => store.open_read(reference).await,
        }
    }

    /// Copy a blob to a local path (staging for the transcoder).
    pub async fn download_to(&self, reference: &str, dest: &Path) -> StorageResult<()> {
        match self {
            Self::Local(store) => store.download_to(reference, dest).await,
            Self::S3(store) => store.download_to(reference, dest).await,
        }
    }

    /// Delete a blob. Returns whether anything was deleted; failures are
    /// reported as `false`, matching the best-effort retention contract.
    pub async fn delete(&self, reference: &str) -> StorageResult<bool> {
        match self {
            Self::Local(store) => store.delete(reference).await,
            Self::S3(store) => store.delete(reference).await,
        }
    }

    /// Whether a blob exists.
    pub async fn exists(&self, reference: &str) -> StorageResult<bool> {
        match self {
            Self::Local(store) => store.exists(reference).await,
            Self::S3(store) => store.exists(reference).await,
        }
    }

    /// Size of a blob in bytes, `None` when it does not exist.
    pub async fn size(&self, reference: &str) -> StorageResult<Option<u64>> {
        match self {
            Self::Local(store) => store.size(reference).await,
            Self::S3(store) => store.size(reference).await,
        }
    }

    /// For the local backend, the on-disk path of a reference; lets the
    /// pipeline hand files to the transcoder without a staging copy.
    pub fn local_path(&self, reference: &str) -> Option<PathBuf> {
        match self {
            Self::Local(store) => store.resolve(reference).ok(),
            Self::S3(_) => None,
        }
    }
}

/// Replace path separators and control characters so an uploaded filename
/// can never escape its directory.
pub(crate) fn sanitize_filename(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        "_".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("video.mp4"), "video.mp4");
        assert_eq!(sanitize_filename("a/b\\c.mp4"), "a_b_c.mp4");
        assert_eq!(sanitize_filename("line\nbreak"), "line_break");
        assert_eq!(sanitize_filename(".."), "_");
        assert_eq!(sanitize_filename(""), "_");
    }
}

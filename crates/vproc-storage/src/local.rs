//! Local filesystem blob storage.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::{sanitize_filename, BlobReader};

/// Blob storage rooted at a base directory.
///
/// References are paths relative to the base; any reference that would
/// resolve outside it (absolute, or containing `..`) is rejected.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Resolve a reference to its on-disk path, containing it to the base.
    pub fn resolve(&self, reference: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(reference);

        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(StorageError::invalid_reference(reference)),
            }
        }

        Ok(self.base.join(relative))
    }

    pub async fn save_file(
        &self,
        path: &Path,
        directory: &str,
        filename: &str,
    ) -> StorageResult<String> {
        let reference = self.make_reference(directory, filename)?;
        let dest = self.resolve(&reference)?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::copy(path, &dest).await?;

        debug!("Saved blob to filesystem: {}", dest.display());
        Ok(reference)
    }

    pub async fn save_bytes(
        &self,
        data: Vec<u8>,
        directory: &str,
        filename: &str,
    ) -> StorageResult<String> {
        let reference = self.make_reference(directory, filename)?;
        let dest = self.resolve(&reference)?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&dest, data).await?;

        debug!("Saved blob to filesystem: {}", dest.display());
        Ok(reference)
    }

    pub async fn read(&self, reference: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(reference)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(reference))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn open_read(&self, reference: &str) -> StorageResult<BlobReader> {
        let path = self.resolve(reference)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(BlobReader::File(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(reference))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn download_to(&self, reference: &str, dest: &Path) -> StorageResult<()> {
        let src = self.resolve(reference)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::copy(&src, dest).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(reference))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, reference: &str) -> StorageResult<bool> {
        let path = self.resolve(reference)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted blob from filesystem: {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                warn!("Failed to delete blob {}: {}", path.display(), e);
                Ok(false)
            }
        }
    }

    pub async fn exists(&self, reference: &str) -> StorageResult<bool> {
        let path = self.resolve(reference)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    pub async fn size(&self, reference: &str) -> StorageResult<Option<u64>> {
        let path = self.resolve(reference)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn make_reference(&self, directory: &str, filename: &str) -> StorageResult<String> {
        let directory = directory.trim_matches('/');
        if directory.is_empty() {
            return Ok(sanitize_filename(filename));
        }
        // The directory component goes through the same containment check
        // as a full reference.
        let reference = format!("{directory}/{}", sanitize_filename(filename));
        self.resolve(&reference)?;
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalBlobStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_save_read_delete_round_trip() {
        let (_dir, store) = store();

        let reference = store
            .save_bytes(b"media bytes".to_vec(), "uploads", "clip.mp4")
            .await
            .unwrap();
        assert_eq!(reference, "uploads/clip.mp4");

        assert!(store.exists(&reference).await.unwrap());
        assert_eq!(store.size(&reference).await.unwrap(), Some(11));
        assert_eq!(store.read(&reference).await.unwrap(), b"media bytes");

        assert!(store.delete(&reference).await.unwrap());
        assert!(!store.exists(&reference).await.unwrap());
        // Deleting again reports nothing removed.
        assert!(!store.delete(&reference).await.unwrap());
    }

    #[tokio::test]
    async fn test_traversal_references_rejected() {
        let (_dir, store) = store();

        for reference in ["../escape.mp4", "uploads/../../etc/passwd", "/etc/passwd"] {
            assert!(
                matches!(
                    store.read(reference).await,
                    Err(StorageError::InvalidReference(_))
                ),
                "{reference} was not rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_filenames_are_sanitized() {
        let (_dir, store) = store();
        let reference = store
            .save_bytes(b"x".to_vec(), "uploads", "evil/../name.mp4")
            .await
            .unwrap();
        assert_eq!(reference, "uploads/evil_.._name.mp4");
        assert!(store.exists(&reference).await.unwrap());
    }

    #[tokio::test]
    async fn test_download_to_stages_copy() {
        let (dir, store) = store();
        let reference = store
            .save_bytes(b"payload".to_vec(), "uploads", "a.mp4")
            .await
            .unwrap();

        let staged = dir.path().join("work/staged.mp4");
        store.download_to(&reference, &staged).await.unwrap();
        assert_eq!(std::fs::read(&staged).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.read("uploads/absent.mp4").await,
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(store.size("uploads/absent.mp4").await.unwrap(), None);
    }
}

//! On-disk persistence for uploaded bytes
//!
//! Files live in a single flat directory, named `<id><extension>`. All
//! metadata lives in the in-memory registry, never on disk.

use std::path::{Path, PathBuf};

use crate::error::{RelayError, RelayResult};

/// Blob store backed by a flat storage directory
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Create a blob store rooted at `dir`, creating the directory if absent
    pub async fn new(dir: impl Into<PathBuf>) -> RelayResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            RelayError::Storage(format!("failed to create storage directory: {}", e))
        })?;
        Ok(Self { dir })
    }

    /// Get the storage directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Staging path for an in-progress upload. Staged files are dotted so
    /// they can never collide with a stored `<id><extension>` name.
    pub fn stage(&self, id: &str) -> PathBuf {
        self.dir.join(format!(".{}.part", id))
    }

    /// Write `content` to a new file named `file_name` in the store
    pub async fn save(&self, content: &[u8], file_name: &str) -> RelayResult<PathBuf> {
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| RelayError::Storage(format!("failed to write file: {}", e)))?;
        Ok(path)
    }

    /// Move a staged temp file into the store under its final name
    ///
    /// Renames in place so large uploads are not read back and rewritten.
    /// Falls back to copy + delete when the rename crosses filesystems.
    pub async fn adopt(&self, temp_path: &Path, file_name: &str) -> RelayResult<PathBuf> {
        let path = self.dir.join(file_name);
        if let Err(rename_err) = tokio::fs::rename(temp_path, &path).await {
            tracing::debug!(
                "rename into store failed ({}), falling back to copy",
                rename_err
            );
            tokio::fs::copy(temp_path, &path)
                .await
                .map_err(|e| RelayError::Storage(format!("failed to copy file: {}", e)))?;
            let _ = tokio::fs::remove_file(temp_path).await;
        }
        Ok(path)
    }

    /// Open a stored file for reading
    ///
    /// # Returns
    /// * `RelayError::NotFound` if the file was deleted externally between
    ///   registry lookup and read
    pub async fn open(&self, path: &Path) -> RelayResult<tokio::fs::File> {
        tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RelayError::NotFound("file not found".to_string()),
            _ => RelayError::Storage(format!("failed to open file: {}", e)),
        })
    }
}

//! Preview storage directory
//!
//! One flat directory holding a `<hex-key>.jpeg` file per live cache entry.
//! Files are published with a temp-file + rename so a reader never observes
//! a partially written preview.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::defaults::DEFAULT_TEMP_DIR_PREFIX;
use crate::errors::StorageError;
use crate::models::CacheKey;

#[derive(Debug, Clone)]
pub struct PreviewStorage {
    dir: PathBuf,
    /// Present when the directory was allocated by us; removed on drop
    temp_dir: Option<Arc<TempDir>>,
}

impl PreviewStorage {
    /// Use an operator-provided directory, creating it when missing. It is never removed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| StorageError::CreateDirectory {
                path: dir.clone(),
                source,
            })?;
        info!(directory = %dir.display(), "Using preview cache directory");
        Ok(Self {
            dir,
            temp_dir: None,
        })
    }

    /// Allocate a fresh temporary directory that is deleted with the last clone
    pub fn temporary() -> Result<Self, StorageError> {
        let temp_dir = tempfile::Builder::new()
            .prefix(DEFAULT_TEMP_DIR_PREFIX)
            .tempdir()
            .map_err(|source| StorageError::CreateDirectory {
                path: std::env::temp_dir(),
                source,
            })?;
        let dir = temp_dir.path().to_path_buf();
        info!(directory = %dir.display(), "Allocated temporary preview cache directory");
        Ok(Self {
            dir,
            temp_dir: Some(Arc::new(temp_dir)),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn is_auto_allocated(&self) -> bool {
        self.temp_dir.is_some()
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Atomically publish `data` as the preview for `key` and return its path
    pub async fn write(&self, key: &CacheKey, data: &[u8]) -> Result<PathBuf, StorageError> {
        let final_path = self.path_for(key);
        let tmp_path = self.dir.join(format!(".{}.{}.tmp", key, Uuid::new_v4()));

        if let Err(source) = write_file(&tmp_path, data).await {
            remove_quietly(&tmp_path).await;
            return Err(StorageError::Write {
                path: tmp_path,
                source,
            });
        }

        if let Err(source) = fs::rename(&tmp_path, &final_path).await {
            remove_quietly(&tmp_path).await;
            return Err(StorageError::Write {
                path: final_path,
                source,
            });
        }

        debug!(key = %key, path = %final_path.display(), bytes = data.len(), "Stored preview");
        Ok(final_path)
    }

    pub async fn read(&self, path: &Path) -> Result<Bytes, StorageError> {
        fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|source| StorageError::Read {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Remove an auto-allocated directory now, reporting failures instead of
    /// silently ignoring them on drop. No-op for operator-provided directories
    /// or while other clones are still alive.
    pub fn cleanup(self) -> Result<(), StorageError> {
        let Some(temp_dir) = self.temp_dir else {
            return Ok(());
        };
        match Arc::try_unwrap(temp_dir) {
            Ok(temp_dir) => {
                temp_dir
                    .close()
                    .map_err(|source| StorageError::Remove {
                        path: self.dir.clone(),
                        source,
                    })?;
                info!(directory = %self.dir.display(), "Removed temporary preview cache directory");
                Ok(())
            }
            Err(_) => {
                warn!(
                    directory = %self.dir.display(),
                    "Preview cache directory still in use, leaving removal to the last owner"
                );
                Ok(())
            }
        }
    }
}

async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_data().await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(())
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove temporary preview file");
        }
    }
}

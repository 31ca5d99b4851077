//! Local filesystem object store
//!
//! Objects live at `<root>/<bucket>/<key>`.

use async_trait::async_trait;
use glob::glob;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{validate_key, ObjectStore};
use crate::errors::StorageError;

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    bucket: String,
    bucket_dir: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>, bucket: &str) -> Result<Self, StorageError> {
        let bucket_dir = root.as_ref().join(bucket);
        std::fs::create_dir_all(&bucket_dir)?;
        Ok(Self {
            bucket: bucket.to_string(),
            bucket_dir,
        })
    }

    fn full_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.bucket_dir.join(key))
    }

    async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn not_found(key: &str, err: std::io::Error) -> StorageError {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound {
                key: key.to_string(),
            }
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<(), StorageError> {
        let dest = self.full_path(key)?;
        Self::ensure_parent(&dest).await?;
        tokio::fs::copy(local_path, &dest).await?;
        debug!("Stored {} at {}", local_path.display(), dest.display());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.full_path(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| Self::not_found(key, e))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let pattern = format!(
            "{}/**/*",
            glob::Pattern::escape(&self.bucket_dir.to_string_lossy())
        );

        let mut keys = Vec::new();
        for entry in glob(&pattern).map_err(|e| StorageError::Configuration {
            reason: format!("Glob pattern error: {}", e),
        })? {
            let path = entry.map_err(|e| StorageError::Io {
                reason: e.to_string(),
            })?;
            if !path.is_file() {
                continue;
            }
            let relative = path
                .strip_prefix(&self.bucket_dir)
                .map_err(|e| StorageError::Io {
                    reason: e.to_string(),
                })?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.full_path(key)?;
        Ok(tokio::fs::try_exists(&path).await? && path.is_file())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        let src_path = self.full_path(src)?;
        let dst_path = self.full_path(dst)?;
        Self::ensure_parent(&dst_path).await?;
        tokio::fs::copy(&src_path, &dst_path)
            .await
            .map_err(|e| Self::not_found(src, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.full_path(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Self::not_found(key, e))
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn store_type(&self) -> &'static str {
        "local"
    }
}

//! Object storage abstraction
//!
//! Keys are bucket-relative and `/`-separated (`source/1709634000.json`).
//! Two backends exist: Google Cloud Storage over its JSON API, and a local
//! directory tree used for development and tests.

pub mod gcs;
pub mod local;

pub use gcs::GcsObjectStore;
pub use local::LocalObjectStore;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, StorageBackend};
use crate::errors::StorageError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file to `key`, replacing any existing object.
    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<(), StorageError>;

    /// Read an object's full contents.
    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// All keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Check if an object exists.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Server-side copy within the bucket.
    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError>;

    /// Delete an object. Missing objects are `NotFound`.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Copy then delete the source.
    async fn move_object(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        self.copy(src, dst).await?;
        self.delete(src).await?;
        Ok(())
    }

    fn bucket(&self) -> &str;

    /// Backend name for logging.
    fn store_type(&self) -> &'static str;
}

/// Build the backend selected in configuration
pub fn build_object_store(config: &Config) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.storage.backend {
        StorageBackend::Gcs => Ok(Arc::new(GcsObjectStore::new(
            &config.storage,
            config.gcs_access_token.clone(),
        )?)),
        StorageBackend::Local => {
            let root = config
                .storage
                .local_root
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("storage.local_root is not set"))?;
            Ok(Arc::new(LocalObjectStore::new(root, &config.storage.bucket)?))
        }
    }
}

/// Reject keys that are empty, absolute, or escape the bucket
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if invalid {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Final path segment of a key
pub fn object_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

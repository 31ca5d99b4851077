use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::errors::{LocalFsError, PipelineResult, StorageError};
use crate::run_context::RunContext;
use crate::storage::ObjectStore;

/// Uploads the scratch file to the run's staging key.
///
/// Artifacts are written once: if the staging key or its archive key is
/// already taken the stage fails instead of replacing the existing object.
pub struct UploadStage {
    store: Arc<dyn ObjectStore>,
    scratch_path: PathBuf,
}

impl UploadStage {
    pub fn new(store: Arc<dyn ObjectStore>, scratch_path: PathBuf) -> Self {
        Self {
            store,
            scratch_path,
        }
    }

    /// Returns the key written
    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    pub async fn run(&self, ctx: &RunContext) -> PipelineResult<String> {
        let present = tokio::fs::try_exists(&self.scratch_path)
            .await
            .map_err(|e| LocalFsError::ReadFailed {
                path: self.scratch_path.display().to_string(),
                reason: e.to_string(),
            })?;
        if !present {
            return Err(LocalFsError::Missing {
                path: self.scratch_path.display().to_string(),
            }
            .into());
        }

        let key = ctx.source_key();
        for taken in [key.clone(), ctx.raw_key(&ctx.artifact_name())] {
            if self.store.exists(&taken).await? {
                return Err(StorageError::AlreadyExists { key: taken }.into());
            }
        }

        self.store.upload_file(&self.scratch_path, &key).await?;

        info!(
            "Uploaded {} to {}://{}/{}",
            self.scratch_path.display(),
            self.store.store_type(),
            self.store.bucket(),
            key
        );
        Ok(key)
    }
}

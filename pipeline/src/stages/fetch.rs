use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::{LocalFsError, PipelineResult};
use crate::run_context::RunContext;
use crate::spotify::SpotifyClient;

#[derive(Debug, Clone, Serialize)]
pub struct FetchSummary {
    pub records: usize,
    pub bytes: usize,
    pub newest_played_at: Option<DateTime<Utc>>,
}

/// Pulls the latest playback batch and lands it in the scratch file
pub struct FetchStage {
    client: SpotifyClient,
    limit: u32,
    scratch_path: PathBuf,
}

impl FetchStage {
    pub fn new(client: SpotifyClient, limit: u32, scratch_path: PathBuf) -> Self {
        Self {
            client,
            limit,
            scratch_path,
        }
    }

    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    pub async fn run(&self, ctx: &RunContext) -> PipelineResult<FetchSummary> {
        let batch = self.client.recently_played(self.limit).await?;

        let bytes = batch.as_bytes();
        write_atomically(&self.scratch_path, bytes).await?;

        info!(
            "Wrote {} records ({} bytes) to {}",
            batch.len(),
            bytes.len(),
            self.scratch_path.display()
        );

        Ok(FetchSummary {
            records: batch.len(),
            bytes: bytes.len(),
            newest_played_at: batch.newest_played_at(),
        })
    }
}

/// Replace `path` with `content` via a sibling temp file and rename, so
/// readers never observe a partial write
pub async fn write_atomically(path: &Path, content: &[u8]) -> PipelineResult<()> {
    let display = path.display().to_string();
    let write_err = |e: std::io::Error| LocalFsError::WriteFailed {
        path: display.clone(),
        reason: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| LocalFsError::WriteFailed {
            path: display.clone(),
            reason: "path has no file name".to_string(),
        })?;
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    if let Err(e) = tokio::fs::write(&tmp_path, content).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e).into());
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e).into());
    }
    Ok(())
}

//! Move staged artifacts into the date-partitioned archive
//!
//! Every `source/*.json` object is a candidate. The run's own artifact is
//! always moved; any other candidate is an orphan from an earlier run that
//! failed between upload and move. Orphans are swept into this run's
//! partition when sweeping is enabled and left in place otherwise.

use glob::{MatchOptions, Pattern};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::errors::{PipelineResult, StorageError};
use crate::run_context::RunContext;
use crate::storage::{object_name, ObjectStore};

#[derive(Debug, Clone, Default, Serialize)]
pub struct MoveSummary {
    pub own_artifact_moved: bool,
    pub swept: Vec<String>,
    pub skipped_orphans: Vec<String>,
}

impl MoveSummary {
    pub fn moved_count(&self) -> usize {
        self.swept.len() + usize::from(self.own_artifact_moved)
    }
}

pub struct ArchiveStage {
    store: Arc<dyn ObjectStore>,
    sweep_orphans: bool,
}

impl ArchiveStage {
    pub fn new(store: Arc<dyn ObjectStore>, sweep_orphans: bool) -> Self {
        Self {
            store,
            sweep_orphans,
        }
    }

    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    pub async fn run(&self, ctx: &RunContext) -> PipelineResult<MoveSummary> {
        let candidates = self.staged_artifacts(ctx).await?;
        let own_key = ctx.source_key();
        let mut summary = MoveSummary::default();

        if candidates.iter().any(|k| k == &own_key) {
            self.move_to_raw(ctx, &own_key).await?;
            summary.own_artifact_moved = true;
        } else {
            warn!("Own artifact {} not found under {}", own_key, ctx.source_prefix());
        }

        for key in candidates.into_iter().filter(|k| k != &own_key) {
            if self.sweep_orphans {
                warn!("Sweeping orphaned object {} into {}", key, ctx.raw_prefix());
                self.move_to_raw(ctx, &key).await?;
                summary.swept.push(key);
            } else {
                warn!("Leaving orphaned object {} in place (sweeping disabled)", key);
                summary.skipped_orphans.push(key);
            }
        }

        info!(
            "Archived {} object(s) into {} ({} orphans swept, {} left)",
            summary.moved_count(),
            ctx.raw_prefix(),
            summary.swept.len(),
            summary.skipped_orphans.len()
        );
        Ok(summary)
    }

    /// Keys under the staging prefix matching the single-segment JSON wildcard
    async fn staged_artifacts(&self, ctx: &RunContext) -> PipelineResult<Vec<String>> {
        let source_prefix = ctx.source_prefix();
        // The prefix comes from configuration and is matched literally
        let wildcard = format!("{}*.json", Pattern::escape(&source_prefix));
        let pattern = Pattern::new(&wildcard).map_err(|e| StorageError::Configuration {
            reason: format!("invalid wildcard '{}': {}", wildcard, e),
        })?;
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        let keys = self.store.list(&source_prefix).await?;
        Ok(keys
            .into_iter()
            .filter(|k| pattern.matches_with(k, options))
            .collect())
    }

    async fn move_to_raw(&self, ctx: &RunContext, key: &str) -> PipelineResult<()> {
        let dst = ctx.raw_key(object_name(key));
        self.store.move_object(key, &dst).await?;
        info!("Moved {} -> {}", key, dst);
        Ok(())
    }
}

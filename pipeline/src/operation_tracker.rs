//! Run leases
//!
//! At most one run per workflow may touch shared storage. A lease keyed by
//! workflow id is taken before the first stage and dropped after the last
//! one, whatever the outcome. Leases live in the run history database, so a
//! foreground `pipeline run` and the `serve` process exclude each other.
//! Leases whose holder has been gone longer than the stale age are
//! force-released by the periodic cleanup in `main`.
//!
//! ```ignore
//! tracker.try_acquire("spotify-recently-played-v2", &ctx.run_id, Trigger::Scheduled).await?;
//! // run stages...
//! tracker.release("spotify-recently-played-v2", &ctx.run_id).await;
//! ```

use anyhow::anyhow;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::database::{Database, LeaseRecord};
use crate::run_context::Trigger;

const ACQUIRE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct LeaseStatus {
    pub active_runs: HashMap<String, LeaseRecord>,
    pub total_active: usize,
}

/// Returned when another run already holds the workflow's lease
#[derive(Debug, Clone)]
pub struct LeaseHeld {
    pub holder: LeaseRecord,
}

impl fmt::Display for LeaseHeld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let held_for = Utc::now().signed_duration_since(self.holder.acquired_at);
        let held_str = if held_for.num_hours() > 0 {
            format!("{}h {}m", held_for.num_hours(), held_for.num_minutes() % 60)
        } else {
            format!("{}m", held_for.num_minutes())
        };
        write!(
            f,
            "Workflow {} is busy with {} run {} (started {} ago)",
            self.holder.workflow_id, self.holder.trigger, self.holder.run_id, held_str
        )
    }
}

impl std::error::Error for LeaseHeld {}

#[derive(Debug)]
pub enum LeaseError {
    /// Another run holds the workflow's lease
    Held(LeaseHeld),

    /// The lease table could not be read or written
    Store(anyhow::Error),
}

impl fmt::Display for LeaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseError::Held(held) => write!(f, "{}", held),
            LeaseError::Store(e) => write!(f, "Run lease store unavailable: {}", e),
        }
    }
}

impl std::error::Error for LeaseError {}

impl From<anyhow::Error> for LeaseError {
    fn from(err: anyhow::Error) -> Self {
        LeaseError::Store(err)
    }
}

#[derive(Clone)]
pub struct RunLeaseTracker {
    database: Arc<Database>,
}

impl RunLeaseTracker {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    #[instrument(skip(self), fields(workflow = %workflow_id, run_id = %run_id))]
    pub async fn try_acquire(
        &self,
        workflow_id: &str,
        run_id: &str,
        trigger: Trigger,
    ) -> Result<(), LeaseError> {
        let lease = LeaseRecord {
            workflow_id: workflow_id.to_string(),
            run_id: run_id.to_string(),
            trigger: trigger.to_string(),
            acquired_at: Utc::now(),
        };

        for _ in 0..ACQUIRE_ATTEMPTS {
            if self.database.insert_lease(&lease).await? {
                info!("Acquired run lease for {}", workflow_id);
                return Ok(());
            }
            // Holder may release between the insert and this read
            if let Some(holder) = self.database.get_lease(workflow_id).await? {
                return Err(LeaseError::Held(LeaseHeld { holder }));
            }
        }

        Err(LeaseError::Store(anyhow!(
            "Lease for {} kept changing hands",
            workflow_id
        )))
    }

    /// Drop the lease if `run_id` still holds it. A lease that was
    /// force-released and re-acquired by another run is left alone.
    #[instrument(skip(self), fields(workflow = %workflow_id, run_id = %run_id))]
    pub async fn release(&self, workflow_id: &str, run_id: &str) {
        match self.database.delete_lease(workflow_id, run_id).await {
            Ok(true) => info!("Released run lease for {}", workflow_id),
            Ok(false) => match self.database.get_lease(workflow_id).await {
                Ok(Some(holder)) => warn!(
                    "Lease for {} now belongs to run {}, not releasing",
                    workflow_id, holder.run_id
                ),
                Ok(None) => {}
                Err(e) => error!("Failed to read lease for {}: {}", workflow_id, e),
            },
            Err(e) => error!(
                "Failed to release lease for {}; stale cleanup will drop it: {}",
                workflow_id, e
            ),
        }
    }

    /// Force-release regardless of holder (manual cleanup)
    pub async fn force_release(&self, workflow_id: &str) -> anyhow::Result<LeaseRecord> {
        let holder = self
            .database
            .get_lease(workflow_id)
            .await?
            .ok_or_else(|| anyhow!("No active run found for {}", workflow_id))?;

        if !self.database.delete_lease(workflow_id, &holder.run_id).await? {
            return Err(anyhow!("Lease for {} changed hands, retry", workflow_id));
        }
        self.database
            .fail_abandoned_run(&holder.run_id, "run lease force-released")
            .await?;

        warn!(
            "Force-released lease for {} held by run {} for {}m",
            workflow_id,
            holder.run_id,
            Utc::now()
                .signed_duration_since(holder.acquired_at)
                .num_minutes()
        );
        Ok(holder)
    }

    pub async fn status(&self) -> anyhow::Result<LeaseStatus> {
        let leases = self.database.all_leases().await?;
        Ok(LeaseStatus {
            total_active: leases.len(),
            active_runs: leases
                .into_iter()
                .map(|lease| (lease.workflow_id.clone(), lease))
                .collect(),
        })
    }

    pub async fn is_busy(&self, workflow_id: &str) -> anyhow::Result<bool> {
        Ok(self.database.get_lease(workflow_id).await?.is_some())
    }

    pub async fn holder(&self, workflow_id: &str) -> anyhow::Result<Option<LeaseRecord>> {
        self.database.get_lease(workflow_id).await
    }

    /// Force-release leases older than `max_hours` and fail their runs
    pub async fn cleanup_stale(&self, max_hours: i64) -> anyhow::Result<u32> {
        let cutoff = Utc::now() - chrono::Duration::hours(max_hours);
        let mut released = 0;

        for holder in self.database.leases_acquired_before(cutoff).await? {
            if !self
                .database
                .delete_lease(&holder.workflow_id, &holder.run_id)
                .await?
            {
                continue;
            }
            self.database
                .fail_abandoned_run(&holder.run_id, "run lease went stale")
                .await?;
            warn!(
                "Released stale lease on {} held by run {} for {}h",
                holder.workflow_id,
                holder.run_id,
                Utc::now()
                    .signed_duration_since(holder.acquired_at)
                    .num_hours()
            );
            released += 1;
        }

        Ok(released)
    }
}

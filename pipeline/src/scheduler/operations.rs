use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, instrument, warn};

use super::normalize_schedule;
use crate::config::Config;
use crate::run_context::{truncate_to_minute, Trigger};
use crate::services::WorkflowRunner;

/// Fires the workflow on its cron schedule. Missed intervals are not
/// replayed and firings before the start date are ignored.
pub struct WorkflowScheduler {
    config: Arc<Config>,
    runner: WorkflowRunner,
    scheduler: JobScheduler,
}

impl WorkflowScheduler {
    pub async fn new(config: Arc<Config>, runner: WorkflowRunner) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;

        Ok(Self {
            config,
            runner,
            scheduler,
        })
    }

    #[instrument(skip(self), fields(workflow = %self.config.workflow.id))]
    pub async fn start(&self) -> Result<()> {
        let workflow = &self.config.workflow;
        let cron = normalize_schedule(&workflow.schedule)?;
        let start_date = workflow.start_date;
        let runner = self.runner.clone();

        let job = Job::new_async(cron.as_str(), move |_uuid, _scheduler| {
            let runner = runner.clone();

            Box::pin(async move {
                let logical_date = truncate_to_minute(Utc::now());
                if !should_fire(logical_date, start_date) {
                    info!(
                        "Ignoring trigger at {} before start date {}",
                        logical_date, start_date
                    );
                    return;
                }

                let ctx = runner.context(logical_date, Trigger::Scheduled);
                match runner.run(ctx).await {
                    Ok(record) => info!(
                        "Scheduled run {} finished with status {}",
                        record.run_id, record.status
                    ),
                    Err(e) => error!("Scheduled run could not be recorded: {}", e),
                }
            })
        })
        .map_err(|e| anyhow!("Failed to create workflow job for '{}': {}", cron, e))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to add workflow job to scheduler: {}", e))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start scheduler: {}", e))?;

        if Utc::now() < start_date {
            warn!("Start date {} is in the future; triggers until then are ignored", start_date);
        }
        info!(
            "Scheduled workflow {} (owner {}) with '{}' → '{}'",
            workflow.id, workflow.owner, workflow.schedule, cron
        );
        Ok(())
    }
}

fn should_fire(logical_date: DateTime<Utc>, start_date: DateTime<Utc>) -> bool {
    logical_date >= start_date
}

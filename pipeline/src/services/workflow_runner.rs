//! Executes one workflow run end to end
//!
//! fetch → upload → archive, strictly in order. The run holds the
//! workflow's lease for its whole lifetime and every stage attempt is
//! recorded with its try number.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::constants::stages;
use crate::database::{status, Database, RunRecord, StageRecord};
use crate::errors::{PipelineError, PipelineResult};
use crate::operation_tracker::{LeaseError, LeaseHeld, RunLeaseTracker};
use crate::run_context::{RunContext, Trigger};
use crate::services::alert_service::AlertService;
use crate::spotify::SpotifyClient;
use crate::stages::{ArchiveStage, FetchStage, UploadStage};
use crate::storage::{build_object_store, ObjectStore};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retries: config.workflow.retries,
            delay: config.workflow.retry_delay(),
        }
    }

    fn max_tries(&self) -> i64 {
        i64::from(self.retries) + 1
    }
}

struct StageFailure {
    stage_id: &'static str,
    error: PipelineError,
}

#[derive(Clone)]
pub struct WorkflowRunner {
    config: Arc<Config>,
    database: Arc<Database>,
    leases: RunLeaseTracker,
    alerts: AlertService,
    retry: RetryPolicy,
    fetch: Arc<FetchStage>,
    upload: Arc<UploadStage>,
    archive: Arc<ArchiveStage>,
}

impl WorkflowRunner {
    pub fn new(
        config: Arc<Config>,
        database: Arc<Database>,
        leases: RunLeaseTracker,
        alerts: AlertService,
        store: Arc<dyn ObjectStore>,
        spotify: SpotifyClient,
    ) -> Self {
        let scratch = config.scratch_path();
        Self {
            retry: RetryPolicy::from_config(&config),
            fetch: Arc::new(FetchStage::new(spotify, config.spotify.limit, scratch.clone())),
            upload: Arc::new(UploadStage::new(store.clone(), scratch)),
            archive: Arc::new(ArchiveStage::new(store, config.workflow.sweep_orphans)),
            config,
            database,
            leases,
            alerts,
        }
    }

    /// Build the storage backend and API client from configuration
    pub fn from_config(
        config: Arc<Config>,
        database: Arc<Database>,
        leases: RunLeaseTracker,
        alerts: AlertService,
    ) -> Result<Self> {
        let store = build_object_store(&config)?;
        let spotify = SpotifyClient::new(&config)?;
        Ok(Self::new(config, database, leases, alerts, store, spotify))
    }

    pub fn workflow_id(&self) -> &str {
        &self.config.workflow.id
    }

    pub fn leases(&self) -> &RunLeaseTracker {
        &self.leases
    }

    pub fn context(&self, logical_date: DateTime<Utc>, trigger: Trigger) -> RunContext {
        RunContext::new(
            &self.config.workflow.id,
            logical_date,
            trigger,
            &self.config.storage,
        )
    }

    /// Run in the foreground. A held lease yields a `skipped` record.
    pub async fn run(&self, ctx: RunContext) -> Result<RunRecord> {
        match self
            .leases
            .try_acquire(&ctx.workflow_id, &ctx.run_id, ctx.trigger)
            .await
        {
            Ok(()) => self.run_leased(ctx).await,
            Err(LeaseError::Held(held)) => self.record_skipped(&ctx, &held).await,
            Err(LeaseError::Store(e)) => Err(e),
        }
    }

    /// Take the lease now and execute in the background. Returns the
    /// context of the started run, or the current holder when busy.
    pub async fn trigger_manual(&self) -> Result<RunContext, LeaseError> {
        let ctx = self.context(Utc::now(), Trigger::Manual);

        if let Err(e) = self
            .leases
            .try_acquire(&ctx.workflow_id, &ctx.run_id, ctx.trigger)
            .await
        {
            if let LeaseError::Held(held) = &e {
                if let Err(e) = self.record_skipped(&ctx, held).await {
                    error!("Failed to record skipped run {}: {}", ctx.run_id, e);
                }
            }
            return Err(e);
        }

        let runner = self.clone();
        let spawned = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.run_leased(spawned).await {
                error!("Manual run failed to complete bookkeeping: {}", e);
            }
        });

        Ok(ctx)
    }

    async fn record_skipped(&self, ctx: &RunContext, held: &LeaseHeld) -> Result<RunRecord> {
        warn!(
            "Skipping {} run {} for {}: {}",
            ctx.trigger, ctx.run_id, ctx.logical_date, held
        );
        let now = Utc::now();
        let record = RunRecord {
            run_id: ctx.run_id.clone(),
            workflow_id: ctx.workflow_id.clone(),
            logical_date: ctx.logical_date,
            trigger: ctx.trigger.to_string(),
            status: status::SKIPPED.to_string(),
            started_at: now,
            completed_at: Some(now),
            error_message: Some(held.to_string()),
            source_key: None,
            archived_count: None,
        };
        self.database.store_run(&record).await?;
        Ok(record)
    }

    /// Body of a run whose lease is already held; always releases it
    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id, logical_date = %ctx.logical_date))]
    async fn run_leased(&self, ctx: RunContext) -> Result<RunRecord> {
        let result = self.execute_and_record(&ctx).await;
        self.leases.release(&ctx.workflow_id, &ctx.run_id).await;
        result
    }

    async fn execute_and_record(&self, ctx: &RunContext) -> Result<RunRecord> {
        info!(
            "Starting {} run of {} at {}",
            ctx.trigger,
            ctx.workflow_id,
            ctx.logical_date.to_rfc3339()
        );

        let mut record = RunRecord {
            run_id: ctx.run_id.clone(),
            workflow_id: ctx.workflow_id.clone(),
            logical_date: ctx.logical_date,
            trigger: ctx.trigger.to_string(),
            status: status::RUNNING.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
            source_key: None,
            archived_count: None,
        };
        self.database.store_run(&record).await?;

        let outcome = self.execute_stages(ctx, &mut record).await;
        record.completed_at = Some(Utc::now());

        match outcome {
            Ok(()) => {
                record.status = status::SUCCESS.to_string();
                self.database.store_run(&record).await?;
                info!(
                    "Run {} succeeded ({} object(s) archived)",
                    ctx.run_id,
                    record.archived_count.unwrap_or(0)
                );
                self.alert_if_recovered(ctx).await;
            }
            Err(failure) => {
                record.status = status::FAILED.to_string();
                record.error_message =
                    Some(format!("{}: {}", failure.stage_id, failure.error));
                self.database.store_run(&record).await?;
                error!(
                    "Run {} failed in {}: {}",
                    ctx.run_id, failure.stage_id, failure.error
                );
                self.alerts
                    .alert_run_failed(
                        &ctx.workflow_id,
                        &ctx.run_id,
                        ctx.logical_date,
                        failure.stage_id,
                        &failure.error.to_string(),
                        failure.error.category(),
                    )
                    .await;
            }
        }

        Ok(record)
    }

    async fn execute_stages(
        &self,
        ctx: &RunContext,
        record: &mut RunRecord,
    ) -> Result<(), StageFailure> {
        let (fetch, upload, archive) = (&self.fetch, &self.upload, &self.archive);

        let fetched = self
            .run_stage(ctx, stages::FETCH, move || fetch.run(ctx))
            .await?;
        info!("Fetched {} records", fetched.records);

        let key = self
            .run_stage(ctx, stages::UPLOAD, move || upload.run(ctx))
            .await?;
        record.source_key = Some(key);

        let moved = self
            .run_stage(ctx, stages::ARCHIVE, move || archive.run(ctx))
            .await?;
        record.archived_count = Some(moved.moved_count() as i64);

        Ok(())
    }

    /// Attempt a stage up to `retries + 1` times, recording every try
    async fn run_stage<T, F, Fut>(
        &self,
        ctx: &RunContext,
        stage_id: &'static str,
        attempt: F,
    ) -> Result<T, StageFailure>
    where
        T: Serialize,
        F: Fn() -> Fut,
        Fut: Future<Output = PipelineResult<T>>,
    {
        let max_tries = self.retry.max_tries();
        let mut try_number = 1;

        loop {
            let mut stage = StageRecord {
                run_id: ctx.run_id.clone(),
                stage_id: stage_id.to_string(),
                try_number,
                status: status::RUNNING.to_string(),
                started_at: Utc::now(),
                completed_at: None,
                error_message: None,
                details: None,
            };
            self.store_stage(&stage).await;

            let result = attempt().await;
            stage.completed_at = Some(Utc::now());

            match result {
                Ok(value) => {
                    stage.status = status::SUCCESS.to_string();
                    stage.details = serde_json::to_string(&value).ok();
                    self.store_stage(&stage).await;
                    return Ok(value);
                }
                Err(error) => {
                    stage.status = status::FAILED.to_string();
                    stage.error_message = Some(error.to_string());
                    self.store_stage(&stage).await;

                    if try_number >= max_tries {
                        return Err(StageFailure { stage_id, error });
                    }

                    warn!(
                        "Stage {} try {}/{} failed ({}), retrying in {}s",
                        stage_id,
                        try_number,
                        max_tries,
                        error,
                        self.retry.delay.as_secs()
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    try_number += 1;
                }
            }
        }
    }

    async fn store_stage(&self, stage: &StageRecord) {
        if let Err(e) = self.database.store_stage(stage).await {
            error!(
                "Failed to record stage {} of run {}: {}",
                stage.stage_id, stage.run_id, e
            );
        }
    }

    async fn alert_if_recovered(&self, ctx: &RunContext) {
        match self
            .database
            .last_completed_run(&ctx.workflow_id, &ctx.run_id)
            .await
        {
            Ok(Some(previous)) if previous.status == status::FAILED => {
                info!("Workflow recovered after failed run {}", previous.run_id);
                self.alerts
                    .alert_run_recovered(
                        &ctx.workflow_id,
                        &ctx.run_id,
                        ctx.logical_date,
                        &previous.run_id,
                    )
                    .await;
            }
            Ok(_) => {}
            Err(e) => warn!("Could not look up previous run: {}", e),
        }
    }
}

//! Run and stage history queries.

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::records::{status, RunRecord, StageRecord};
use super::Database;

fn run_from_row(row: &SqliteRow) -> Result<RunRecord> {
    Ok(RunRecord {
        run_id: row.try_get("run_id")?,
        workflow_id: row.try_get("workflow_id")?,
        logical_date: row.try_get("logical_date")?,
        trigger: row.try_get("trigger_kind")?,
        status: row.try_get("status")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        error_message: row.try_get("error_message")?,
        source_key: row.try_get("source_key")?,
        archived_count: row.try_get("archived_count")?,
    })
}

fn stage_from_row(row: &SqliteRow) -> Result<StageRecord> {
    Ok(StageRecord {
        run_id: row.try_get("run_id")?,
        stage_id: row.try_get("stage_id")?,
        try_number: row.try_get("try_number")?,
        status: row.try_get("status")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        error_message: row.try_get("error_message")?,
        details: row.try_get("details")?,
    })
}

const RUN_COLUMNS: &str = "run_id, workflow_id, logical_date, trigger_kind, status, started_at, \
                           completed_at, error_message, source_key, archived_count";

impl Database {
    pub async fn store_run(&self, run: &RunRecord) -> Result<()> {
        debug!("Storing run {} ({})", run.run_id, run.status);

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO workflow_runs (
                run_id, workflow_id, logical_date, trigger_kind, status, started_at,
                completed_at, error_message, source_key, archived_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.run_id)
        .bind(&run.workflow_id)
        .bind(run.logical_date)
        .bind(&run.trigger)
        .bind(&run.status)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(&run.error_message)
        .bind(&run.source_key)
        .bind(run.archived_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM workflow_runs WHERE run_id = ?", RUN_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(run_from_row).transpose()
    }

    pub async fn recent_runs(&self, workflow_id: &str, limit: i64) -> Result<Vec<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM workflow_runs WHERE workflow_id = ? ORDER BY started_at DESC LIMIT ?",
            RUN_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(workflow_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(run_from_row).collect()
    }

    /// Most recent run that reached success or failure, excluding `exclude_run_id`
    pub async fn last_completed_run(
        &self,
        workflow_id: &str,
        exclude_run_id: &str,
    ) -> Result<Option<RunRecord>> {
        let sql = format!(
            "SELECT {} FROM workflow_runs \
             WHERE workflow_id = ? AND run_id != ? AND status IN (?, ?) \
             ORDER BY started_at DESC LIMIT 1",
            RUN_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(workflow_id)
            .bind(exclude_run_id)
            .bind(status::SUCCESS)
            .bind(status::FAILED)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(run_from_row).transpose()
    }

    pub async fn store_stage(&self, stage: &StageRecord) -> Result<()> {
        debug!(
            "Storing stage {} try {} for run {} ({})",
            stage.stage_id, stage.try_number, stage.run_id, stage.status
        );

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO stage_runs (
                run_id, stage_id, try_number, status, started_at,
                completed_at, error_message, details
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&stage.run_id)
        .bind(&stage.stage_id)
        .bind(stage.try_number)
        .bind(&stage.status)
        .bind(stage.started_at)
        .bind(stage.completed_at)
        .bind(&stage.error_message)
        .bind(&stage.details)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn stage_runs(&self, run_id: &str) -> Result<Vec<StageRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, stage_id, try_number, status, started_at,
                   completed_at, error_message, details
            FROM stage_runs
            WHERE run_id = ?
            ORDER BY started_at ASC, try_number ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stage_from_row).collect()
    }

    /// Mark runs and stages left `running` by a previous process as failed.
    /// Runs that still hold a lease belong to another live process and are
    /// left alone; stale lease cleanup handles them if that process died.
    pub async fn fail_interrupted_runs(&self) -> Result<u64> {
        let message = "interrupted: service stopped while the run was active";
        let now = Utc::now();

        let runs = sqlx::query(
            "UPDATE workflow_runs SET status = ?, completed_at = ?, error_message = ? \
             WHERE status = ? AND run_id NOT IN (SELECT run_id FROM run_leases)",
        )
        .bind(status::FAILED)
        .bind(now)
        .bind(message)
        .bind(status::RUNNING)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "UPDATE stage_runs SET status = ?, completed_at = ?, error_message = ? \
             WHERE status = ? AND run_id NOT IN (SELECT run_id FROM run_leases)",
        )
        .bind(status::FAILED)
        .bind(now)
        .bind(message)
        .bind(status::RUNNING)
        .execute(&self.pool)
        .await?;

        Ok(runs.rows_affected())
    }
}

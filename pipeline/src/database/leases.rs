//! Run lease rows, one per workflow.
//!
//! The primary key on `workflow_id` makes the insert the only arbiter, so
//! every process sharing the database file sees the same holder.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::records::{status, LeaseRecord};
use super::Database;

fn lease_from_row(row: &SqliteRow) -> Result<LeaseRecord> {
    Ok(LeaseRecord {
        workflow_id: row.try_get("workflow_id")?,
        run_id: row.try_get("run_id")?,
        trigger: row.try_get("trigger_kind")?,
        acquired_at: row.try_get("acquired_at")?,
    })
}

impl Database {
    /// Insert the lease unless the workflow already has one. Returns whether
    /// this call took it.
    pub async fn insert_lease(&self, lease: &LeaseRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO run_leases (workflow_id, run_id, trigger_kind, acquired_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&lease.workflow_id)
        .bind(&lease.run_id)
        .bind(&lease.trigger)
        .bind(lease.acquired_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_lease(&self, workflow_id: &str) -> Result<Option<LeaseRecord>> {
        let row = sqlx::query(
            "SELECT workflow_id, run_id, trigger_kind, acquired_at FROM run_leases WHERE workflow_id = ?",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(lease_from_row).transpose()
    }

    pub async fn all_leases(&self) -> Result<Vec<LeaseRecord>> {
        let rows = sqlx::query(
            "SELECT workflow_id, run_id, trigger_kind, acquired_at FROM run_leases ORDER BY workflow_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(lease_from_row).collect()
    }

    /// Delete the lease only if `run_id` holds it
    pub async fn delete_lease(&self, workflow_id: &str, run_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM run_leases WHERE workflow_id = ? AND run_id = ?")
            .bind(workflow_id)
            .bind(run_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn leases_acquired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<LeaseRecord>> {
        let rows = sqlx::query(
            "SELECT workflow_id, run_id, trigger_kind, acquired_at FROM run_leases WHERE acquired_at < ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(lease_from_row).collect()
    }

    /// Mark a run whose lease was taken away as failed, if it is still running
    pub async fn fail_abandoned_run(&self, run_id: &str, message: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE workflow_runs SET status = ?, completed_at = ?, error_message = ? \
             WHERE run_id = ? AND status = ?",
        )
        .bind(status::FAILED)
        .bind(Utc::now())
        .bind(message)
        .bind(run_id)
        .bind(status::RUNNING)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

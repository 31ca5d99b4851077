//! SQLite persistence for workflow run history.
//!
//! - `records` - run, stage and lease record types
//! - `runs` - run/stage queries and startup recovery
//! - `leases` - per-workflow run leases shared across processes

mod leases;
mod records;
mod runs;

pub use records::*;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{error, info, warn};

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(database_path: &str) -> Result<Self> {
        info!("Initializing run history database at {}", database_path);

        let in_memory = database_path == ":memory:";

        if !in_memory {
            if let Some(parent) = Path::new(database_path).parent() {
                if !parent.as_os_str().is_empty() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        error!("Failed to create parent directory {:?}: {}", parent, e);
                        return Err(e.into());
                    }
                }
            }
        }

        let database_url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", database_path)
        };

        // Every in-memory connection is its own database
        let max_connections = if in_memory { 1 } else { 5 };

        let pool = match SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&database_url)
            .await
        {
            Ok(pool) => pool,
            Err(e) => {
                error!("Failed to connect to database {}: {}", database_url, e);
                return Err(e.into());
            }
        };

        let database = Self { pool };

        if let Err(e) = database.initialize_tables().await {
            error!("Database table initialization failed: {}", e);
            return Err(e);
        }

        match database.fail_interrupted_runs().await {
            Ok(0) => info!("No interrupted runs found"),
            Ok(count) => warn!("Marked {} interrupted run(s) as failed on startup", count),
            Err(e) => {
                error!("Failed to recover interrupted runs: {}", e);
                warn!("Continuing with startup despite recovery failure");
            }
        }

        info!("Database initialization completed");
        Ok(database)
    }

    async fn initialize_tables(&self) -> Result<()> {
        let runs_table_sql = r#"
            CREATE TABLE IF NOT EXISTS workflow_runs (
                run_id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                logical_date DATETIME NOT NULL,
                trigger_kind TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at DATETIME NOT NULL,
                completed_at DATETIME,
                error_message TEXT,
                source_key TEXT,
                archived_count INTEGER
            )
        "#;
        if let Err(e) = sqlx::query(runs_table_sql).execute(&self.pool).await {
            error!("Failed to create workflow_runs table: {}", e);
            return Err(e.into());
        }

        let runs_index_sql = "CREATE INDEX IF NOT EXISTS idx_runs_workflow_started ON workflow_runs(workflow_id, started_at DESC)";
        sqlx::query(runs_index_sql).execute(&self.pool).await?;

        let runs_status_index_sql =
            "CREATE INDEX IF NOT EXISTS idx_runs_status ON workflow_runs(status)";
        sqlx::query(runs_status_index_sql)
            .execute(&self.pool)
            .await?;

        let stages_table_sql = r#"
            CREATE TABLE IF NOT EXISTS stage_runs (
                run_id TEXT NOT NULL,
                stage_id TEXT NOT NULL,
                try_number INTEGER NOT NULL,
                status TEXT NOT NULL,
                started_at DATETIME NOT NULL,
                completed_at DATETIME,
                error_message TEXT,
                details TEXT,
                PRIMARY KEY (run_id, stage_id, try_number)
            )
        "#;
        if let Err(e) = sqlx::query(stages_table_sql).execute(&self.pool).await {
            error!("Failed to create stage_runs table: {}", e);
            return Err(e.into());
        }

        let leases_table_sql = r#"
            CREATE TABLE IF NOT EXISTS run_leases (
                workflow_id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                trigger_kind TEXT NOT NULL,
                acquired_at DATETIME NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(leases_table_sql).execute(&self.pool).await {
            error!("Failed to create run_leases table: {}", e);
            return Err(e.into());
        }

        info!("Database tables ready");
        Ok(())
    }
}

pub mod handlers;
pub mod server;

pub use server::{create_router, start_web_server};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::database::{Database, RunRecord, StageRecord};
use crate::operation_tracker::RunLeaseTracker;
use crate::services::WorkflowRunner;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub database: Arc<Database>,
    pub runner: WorkflowRunner,
    pub leases: RunLeaseTracker,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Arc<Config>, database: Arc<Database>, runner: WorkflowRunner) -> Self {
        let leases = runner.leases().clone();
        Self {
            config,
            database,
            runner,
            leases,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: String,
    pub workflow_id: String,
    pub schedule: String,
    pub storage_backend: String,
    pub bucket: String,
    pub run_in_progress: bool,
    pub uptime_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    pub run: RunRecord,
    pub stages: Vec<StageRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggeredRun {
    pub run_id: String,
    pub workflow_id: String,
    pub logical_date: DateTime<Utc>,
    pub source_key: String,
}

//! Database record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status values shared by run and stage records
pub mod status {
    pub const RUNNING: &str = "running";
    pub const SUCCESS: &str = "success";
    pub const FAILED: &str = "failed";
    pub const SKIPPED: &str = "skipped";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub workflow_id: String,
    pub logical_date: DateTime<Utc>,
    pub trigger: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub source_key: Option<String>,
    pub archived_count: Option<i64>,
}

/// Holder of a workflow's run lease
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub workflow_id: String,
    pub run_id: String,
    pub trigger: String,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub run_id: String,
    pub stage_id: String,
    pub try_number: i64,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub details: Option<String>,
}

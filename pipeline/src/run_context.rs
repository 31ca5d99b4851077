//! Per-run identity and the object keys derived from it
//!
//! A run is identified by its logical date. Scheduled runs use the fire time
//! truncated to the whole minute; manual runs keep whole seconds so they do
//! not collide with the scheduled run of the same minute. The artifact name,
//! the staging key and the archive partition are all pure functions of that
//! date.

use chrono::{DateTime, Datelike, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::StorageConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub workflow_id: String,
    pub logical_date: DateTime<Utc>,
    pub trigger: Trigger,
    source_prefix: String,
    raw_prefix: String,
}

impl RunContext {
    pub fn new(
        workflow_id: &str,
        logical_date: DateTime<Utc>,
        trigger: Trigger,
        storage: &StorageConfig,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            logical_date: match trigger {
                Trigger::Scheduled => truncate_to_minute(logical_date),
                Trigger::Manual => truncate_to_second(logical_date),
            },
            trigger,
            source_prefix: storage.source_prefix.trim_matches('/').to_string(),
            raw_prefix: storage.raw_prefix.trim_matches('/').to_string(),
        }
    }

    /// Whole Unix seconds of the logical date
    pub fn unix_ts(&self) -> i64 {
        self.logical_date.timestamp()
    }

    /// `<unix_ts>.json`
    pub fn artifact_name(&self) -> String {
        format!("{}.json", self.unix_ts())
    }

    /// Staging prefix with a trailing slash, e.g. `source/`
    pub fn source_prefix(&self) -> String {
        format!("{}/", self.source_prefix)
    }

    /// `source/<unix_ts>.json`
    pub fn source_key(&self) -> String {
        format!("{}/{}", self.source_prefix, self.artifact_name())
    }

    /// `raw/<year>/<month>/<day>/`, month and day without zero padding
    pub fn raw_prefix(&self) -> String {
        format!(
            "{}/{}/{}/{}/",
            self.raw_prefix,
            self.logical_date.year(),
            self.logical_date.month(),
            self.logical_date.day()
        )
    }

    /// Archive key for an object name
    pub fn raw_key(&self, object_name: &str) -> String {
        format!("{}{}", self.raw_prefix(), object_name)
    }
}

/// Drop seconds and sub-seconds so jitter in the fire time does not leak into keys
pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::minutes(1)).unwrap_or(ts)
}

pub fn truncate_to_second(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::seconds(1)).unwrap_or(ts)
}

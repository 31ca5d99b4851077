pub mod manager;
pub mod secrets;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{gcs, spotify, web, workflow};

pub use manager::ConfigManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_scratch_file")]
    pub scratch_file: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub alert_webhook_url: String,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    // Resolved from secrets.toml and the environment, never from main.toml
    #[serde(skip)]
    pub credentials: SpotifyCredentials,
    #[serde(skip)]
    pub gcs_access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_workflow_id")]
    pub id: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_schedule")]
    pub schedule: String,
    #[serde(default = "default_start_date")]
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_true")]
    pub sweep_orphans: bool,
    #[serde(default = "default_stale_run_hours")]
    pub stale_run_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_token_cache_path")]
    pub token_cache_path: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_accounts_base_url")]
    pub accounts_base_url: String,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Gcs,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Root directory of the `local` backend; buckets are subdirectories
    pub local_root: Option<String>,
    #[serde(default = "default_gcs_base_url")]
    pub gcs_base_url: String,
    #[serde(default = "default_gcs_token_url")]
    pub gcs_token_url: String,
    #[serde(default = "default_source_prefix")]
    pub source_prefix: String,
    #[serde(default = "default_raw_prefix")]
    pub raw_prefix: String,
}

/// Spotify application credentials, resolved once at start-up
#[derive(Clone, Default)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for SpotifyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl SpotifyCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl WorkflowConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

impl SpotifyConfig {
    pub fn timeout(&self) -> Duration {
        self.timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(crate::constants::http::REQUEST_TIMEOUT)
    }
}

impl Config {
    pub fn scratch_path(&self) -> PathBuf {
        PathBuf::from(&self.scratch_file)
    }

    pub fn token_cache_path(&self) -> PathBuf {
        PathBuf::from(&self.spotify.token_cache_path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            scratch_file: default_scratch_file(),
            database_path: default_database_path(),
            alert_webhook_url: String::new(),
            workflow: WorkflowConfig::default(),
            spotify: SpotifyConfig::default(),
            storage: StorageConfig::default(),
            credentials: SpotifyCredentials::default(),
            gcs_access_token: None,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            id: default_workflow_id(),
            owner: default_owner(),
            schedule: default_schedule(),
            start_date: default_start_date(),
            retries: workflow::DEFAULT_RETRIES,
            retry_delay_seconds: default_retry_delay_seconds(),
            sweep_orphans: true,
            stale_run_hours: default_stale_run_hours(),
        }
    }
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            redirect_uri: default_redirect_uri(),
            scope: default_scope(),
            token_cache_path: default_token_cache_path(),
            limit: default_limit(),
            api_base_url: default_api_base_url(),
            accounts_base_url: default_accounts_base_url(),
            timeout_seconds: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            bucket: default_bucket(),
            local_root: None,
            gcs_base_url: default_gcs_base_url(),
            gcs_token_url: default_gcs_token_url(),
            source_prefix: default_source_prefix(),
            raw_prefix: default_raw_prefix(),
        }
    }
}

fn default_host() -> String {
    web::DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    web::DEFAULT_PORT
}

fn default_scratch_file() -> String {
    workflow::DEFAULT_SCRATCH_FILE.to_string()
}

fn default_database_path() -> String {
    workflow::DEFAULT_DATABASE_PATH.to_string()
}

fn default_workflow_id() -> String {
    workflow::DEFAULT_WORKFLOW_ID.to_string()
}

fn default_owner() -> String {
    workflow::DEFAULT_OWNER.to_string()
}

fn default_schedule() -> String {
    workflow::DEFAULT_SCHEDULE.to_string()
}

fn default_start_date() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(workflow::DEFAULT_START_DATE)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn default_retry_delay_seconds() -> u64 {
    workflow::DEFAULT_RETRY_DELAY_SECONDS
}

fn default_true() -> bool {
    true
}

fn default_stale_run_hours() -> i64 {
    crate::constants::cleanup::STALE_RUN_HOURS
}

fn default_redirect_uri() -> String {
    spotify::DEFAULT_REDIRECT_URI.to_string()
}

fn default_scope() -> String {
    spotify::RECENTLY_PLAYED_SCOPE.to_string()
}

fn default_token_cache_path() -> String {
    spotify::DEFAULT_TOKEN_CACHE_PATH.to_string()
}

fn default_limit() -> u32 {
    spotify::MAX_RECENTLY_PLAYED_LIMIT
}

fn default_api_base_url() -> String {
    spotify::API_BASE_URL.to_string()
}

fn default_accounts_base_url() -> String {
    spotify::ACCOUNTS_BASE_URL.to_string()
}

fn default_backend() -> StorageBackend {
    StorageBackend::Gcs
}

fn default_bucket() -> String {
    workflow::DEFAULT_BUCKET.to_string()
}

fn default_gcs_base_url() -> String {
    gcs::BASE_URL.to_string()
}

fn default_gcs_token_url() -> String {
    gcs::METADATA_TOKEN_URL.to_string()
}

fn default_source_prefix() -> String {
    workflow::SOURCE_PREFIX.to_string()
}

fn default_raw_prefix() -> String {
    workflow::RAW_PREFIX.to_string()
}

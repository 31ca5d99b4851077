//! Test configuration builder writing `main.toml`, `secrets.toml` and a
//! token cache into a temp directory

use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use pipeline::config::{Config, ConfigManager};
use pipeline::database::{Database, RunRecord};
use pipeline::operation_tracker::RunLeaseTracker;
use pipeline::run_context::Trigger;
use pipeline::services::{AlertService, WorkflowRunner};

use super::test_data::{credentials, token_cache, tokens, BUCKET, WORKFLOW_ID};

#[derive(Clone)]
enum Backend {
    Local,
    Gcs { base_url: String },
}

pub struct TestConfigBuilder {
    temp_dir: TempDir,
    spotify_url: String,
    backend: Backend,
    sweep_orphans: bool,
    retries: u32,
    limit: u32,
    schedule: String,
    alert_webhook_url: String,
    token_expires_at: Option<i64>,
    write_credentials: bool,
}

/// Files written by the builder; the temp directory lives as long as this
pub struct TestEnv {
    _temp_dir: TempDir,
    pub root: PathBuf,
    pub config_dir: PathBuf,
    pub scratch_path: PathBuf,
    pub store_root: PathBuf,
    pub token_cache_path: PathBuf,
    pub database_path: PathBuf,
}

impl TestConfigBuilder {
    pub fn new(spotify_url: &str) -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
            spotify_url: spotify_url.to_string(),
            backend: Backend::Local,
            sweep_orphans: true,
            retries: 0,
            limit: 50,
            schedule: "@hourly".to_string(),
            alert_webhook_url: String::new(),
            token_expires_at: Some(Utc::now().timestamp() + 3600),
            write_credentials: true,
        }
    }

    pub fn with_gcs(mut self, base_url: &str) -> Self {
        self.backend = Backend::Gcs {
            base_url: base_url.to_string(),
        };
        self
    }

    pub fn sweep_orphans(mut self, sweep: bool) -> Self {
        self.sweep_orphans = sweep;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn schedule(mut self, schedule: &str) -> Self {
        self.schedule = schedule.to_string();
        self
    }

    pub fn alert_webhook(mut self, url: &str) -> Self {
        self.alert_webhook_url = url.to_string();
        self
    }

    /// Cached access token already past its expiry
    pub fn expired_token(mut self) -> Self {
        self.token_expires_at = Some(Utc::now().timestamp() - 10);
        self
    }

    /// Do not write a token cache at all
    pub fn without_token_cache(mut self) -> Self {
        self.token_expires_at = None;
        self
    }

    pub fn without_credentials(mut self) -> Self {
        self.write_credentials = false;
        self
    }

    pub fn build(self) -> TestEnv {
        let root = self.temp_dir.path().to_path_buf();
        let config_dir = root.join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        let scratch_path = root.join("scratch").join("spotify.json");
        let store_root = root.join("store");
        let token_cache_path = root.join(".cache");
        let database_path = root.join("data").join("pipeline.db");

        let storage = match &self.backend {
            Backend::Local => format!(
                "backend = \"local\"\nlocal_root = \"{}\"",
                store_root.display()
            ),
            Backend::Gcs { base_url } => format!(
                "backend = \"gcs\"\ngcs_base_url = \"{}\"\ngcs_token_url = \"{}/token\"",
                base_url, base_url
            ),
        };

        let main_toml = format!(
            r#"
host = "127.0.0.1"
port = 0
scratch_file = "{scratch}"
database_path = "{database}"
alert_webhook_url = "{webhook}"

[workflow]
id = "{workflow_id}"
owner = "tests"
schedule = "{schedule}"
start_date = "2022-11-17T14:00:00Z"
retries = {retries}
retry_delay_seconds = 0
sweep_orphans = {sweep}

[spotify]
token_cache_path = "{cache}"
limit = {limit}
api_base_url = "{spotify}"
accounts_base_url = "{spotify}"
timeout_seconds = 5

[storage]
bucket = "{bucket}"
{storage}
"#,
            scratch = scratch_path.display(),
            database = database_path.display(),
            webhook = self.alert_webhook_url,
            workflow_id = WORKFLOW_ID,
            schedule = self.schedule,
            retries = self.retries,
            sweep = self.sweep_orphans,
            cache = token_cache_path.display(),
            limit = self.limit,
            spotify = self.spotify_url,
            bucket = BUCKET,
            storage = storage,
        );
        fs::write(config_dir.join("main.toml"), main_toml).expect("Failed to write main.toml");

        let mut secrets = String::new();
        if self.write_credentials {
            secrets.push_str(&format!(
                "[spotify]\nclient_id = \"{}\"\nclient_secret = \"{}\"\n",
                credentials::CLIENT_ID,
                credentials::CLIENT_SECRET
            ));
        }
        if matches!(self.backend, Backend::Gcs { .. }) {
            secrets.push_str(&format!("\n[gcs]\naccess_token = \"{}\"\n", tokens::GCS_TOKEN));
        }
        fs::write(config_dir.join("secrets.toml"), secrets).expect("Failed to write secrets.toml");

        if let Some(expires_at) = self.token_expires_at {
            let cache = token_cache(tokens::ACCESS_TOKEN, expires_at);
            fs::write(&token_cache_path, cache.to_string()).expect("Failed to write token cache");
        }

        TestEnv {
            _temp_dir: self.temp_dir,
            root,
            config_dir,
            scratch_path,
            store_root,
            token_cache_path,
            database_path,
        }
    }
}

impl TestEnv {
    pub fn config_dir_string(&self) -> String {
        self.config_dir.display().to_string()
    }

    /// Path of an object in the local store's bucket
    pub fn object_path(&self, key: &str) -> PathBuf {
        self.store_root.join(BUCKET).join(key)
    }
}

/// Fully wired runner over a `TestEnv`
pub struct TestPipeline {
    pub config: Arc<Config>,
    pub database: Arc<Database>,
    pub leases: RunLeaseTracker,
    pub runner: WorkflowRunner,
}

impl TestEnv {
    pub async fn config(&self) -> Arc<Config> {
        ConfigManager::new(self.config_dir_string())
            .await
            .expect("Failed to load test config")
            .get_current_config()
    }

    pub async fn pipeline(&self) -> TestPipeline {
        let config = self.config().await;
        let database = Arc::new(
            Database::new(&config.database_path)
                .await
                .expect("Failed to open test database"),
        );
        let leases = RunLeaseTracker::new(database.clone());
        let alerts = AlertService::new(config.alert_webhook_url.clone())
            .expect("Failed to build alert service");
        let runner =
            WorkflowRunner::from_config(config.clone(), database.clone(), leases.clone(), alerts)
                .expect("Failed to build runner");

        TestPipeline {
            config,
            database,
            leases,
            runner,
        }
    }
}

impl TestPipeline {
    pub async fn run_at(&self, logical_date: DateTime<Utc>) -> RunRecord {
        let ctx = self.runner.context(logical_date, Trigger::Scheduled);
        self.runner.run(ctx).await.expect("Run bookkeeping failed")
    }

    /// Foreground run as `pipeline run --logical-date` does it
    pub async fn run_manual_at(&self, logical_date: DateTime<Utc>) -> RunRecord {
        let ctx = self.runner.context(logical_date, Trigger::Manual);
        self.runner.run(ctx).await.expect("Run bookkeeping failed")
    }
}

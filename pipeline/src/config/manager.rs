use super::secrets::SecretsLoader;
use super::{Config, StorageBackend};
use crate::constants::spotify::MAX_RECENTLY_PLAYED_LIMIT;
use crate::scheduler::normalize_schedule;
use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content = fs::read_to_string(&main_config_path)
            .await
            .map_err(|e| anyhow!("Failed to read main config {}: {}", main_config_path, e))?;

        let mut config: Config = toml::from_str(&main_config_content)
            .map_err(|e| anyhow!("Failed to parse main config: {}", e))?;

        let secrets_path = format!("{}/secrets.toml", config_dir);
        debug!("Loading secrets: {}", secrets_path);
        let secrets = SecretsLoader::load(Path::new(&secrets_path))?;
        config.credentials = secrets.spotify_credentials();
        config.gcs_access_token = secrets.gcs_access_token();

        Self::validate(&config)?;

        info!(
            "Loaded workflow '{}' (schedule '{}', bucket '{}', backend {:?})",
            config.workflow.id, config.workflow.schedule, config.storage.bucket, config.storage.backend
        );

        Ok(config)
    }

    fn validate(config: &Config) -> Result<()> {
        normalize_schedule(&config.workflow.schedule)
            .map_err(|e| anyhow!("Invalid workflow schedule: {}", e))?;

        if config.workflow.id.trim().is_empty() {
            return Err(anyhow!("workflow.id must not be empty"));
        }

        if config.spotify.limit == 0 || config.spotify.limit > MAX_RECENTLY_PLAYED_LIMIT {
            return Err(anyhow!(
                "spotify.limit must be between 1 and {}, got {}",
                MAX_RECENTLY_PLAYED_LIMIT,
                config.spotify.limit
            ));
        }

        if config.storage.bucket.trim().is_empty() {
            return Err(anyhow!("storage.bucket must not be empty"));
        }

        if config.storage.backend == StorageBackend::Local && config.storage.local_root.is_none() {
            return Err(anyhow!("storage.local_root is required for the local backend"));
        }

        if config.storage.source_prefix.trim_matches('/').is_empty()
            || config.storage.raw_prefix.trim_matches('/').is_empty()
        {
            return Err(anyhow!("storage prefixes must not be empty"));
        }

        if !config.credentials.is_complete() {
            return Err(anyhow!(
                "Spotify credentials missing: set SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET or config/secrets.toml"
            ));
        }

        Ok(())
    }
}

//! Secrets loader for API credentials.
//!
//! Secrets live in a separate TOML file (config/secrets.toml) that should be
//! excluded from version control. Environment variables take precedence over
//! the file so deployments can inject them without touching disk.
//!
//! Example secrets.toml:
//! ```toml
//! [spotify]
//! client_id = "abc"
//! client_secret = "def"
//!
//! [gcs]
//! access_token = "ya29...."
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::config::SpotifyCredentials;

pub const ENV_SPOTIFY_CLIENT_ID: &str = "SPOTIFY_CLIENT_ID";
pub const ENV_SPOTIFY_CLIENT_SECRET: &str = "SPOTIFY_CLIENT_SECRET";
pub const ENV_GCS_ACCESS_TOKEN: &str = "GCS_ACCESS_TOKEN";

#[derive(Debug, Deserialize, Default)]
pub struct SecretsFile {
    #[serde(default)]
    pub spotify: SpotifySecrets,
    #[serde(default)]
    pub gcs: GcsSecrets,
}

#[derive(Debug, Deserialize, Default)]
pub struct SpotifySecrets {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GcsSecrets {
    pub access_token: Option<String>,
}

pub struct SecretsLoader {
    secrets: SecretsFile,
}

impl SecretsLoader {
    /// Load secrets from the given path.
    /// Returns an empty loader if the file doesn't exist.
    pub fn load(secrets_path: &Path) -> Result<Self> {
        if !secrets_path.exists() {
            warn!(
                "Secrets file not found at {:?}, credentials must come from the environment",
                secrets_path
            );
            return Ok(Self {
                secrets: SecretsFile::default(),
            });
        }

        let content = std::fs::read_to_string(secrets_path)
            .with_context(|| format!("Failed to read secrets file: {:?}", secrets_path))?;

        let secrets: SecretsFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse secrets file: {:?}", secrets_path))?;

        info!("Loaded secrets from {:?}", secrets_path);

        Ok(Self { secrets })
    }

    /// Resolve Spotify credentials, environment first, then file
    pub fn spotify_credentials(&self) -> SpotifyCredentials {
        let client_id = env_non_empty(ENV_SPOTIFY_CLIENT_ID)
            .or_else(|| self.secrets.spotify.client_id.clone())
            .unwrap_or_default();
        let client_secret = env_non_empty(ENV_SPOTIFY_CLIENT_SECRET)
            .or_else(|| self.secrets.spotify.client_secret.clone())
            .unwrap_or_default();
        SpotifyCredentials::new(client_id, client_secret)
    }

    /// Static GCS bearer token, if one is configured
    pub fn gcs_access_token(&self) -> Option<String> {
        env_non_empty(ENV_GCS_ACCESS_TOKEN).or_else(|| {
            self.secrets
                .gcs
                .access_token
                .clone()
                .filter(|t| !t.is_empty())
        })
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

//! Spotify Web API client for playback history

use reqwest::{Client, StatusCode};
use std::fmt;
use tracing::{debug, info, instrument};

use super::auth::SpotifyAuth;
use super::models::PlaybackBatch;
use crate::config::Config;
use crate::constants::{http, spotify};
use crate::errors::{AuthError, HttpError, PipelineResult};

#[derive(Clone)]
pub struct SpotifyClient {
    http_client: Client,
    api_base_url: String,
    auth: std::sync::Arc<SpotifyAuth>,
}

impl fmt::Debug for SpotifyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyClient")
            .field("api_base_url", &self.api_base_url)
            .field("token_cache", &self.auth.cache_path())
            .finish()
    }
}

impl SpotifyClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(config.spotify.timeout())
            .connect_timeout(http::CONNECT_TIMEOUT)
            .build()?;

        let auth = SpotifyAuth::new(http_client.clone(), config);

        Ok(Self {
            http_client,
            api_base_url: config.spotify.api_base_url.trim_end_matches('/').to_string(),
            auth: std::sync::Arc::new(auth),
        })
    }

    pub fn auth(&self) -> &SpotifyAuth {
        &self.auth
    }

    /// Most recent playback records for the authorized user.
    ///
    /// A single request; `limit` is clamped to the API maximum and the
    /// response's paging cursors are ignored.
    #[instrument(skip(self))]
    pub async fn recently_played(&self, limit: u32) -> PipelineResult<PlaybackBatch> {
        let limit = limit.clamp(1, spotify::MAX_RECENTLY_PLAYED_LIMIT);
        let token = self.auth.access_token().await?;
        let url = format!("{}{}", self.api_base_url, spotify::RECENTLY_PLAYED_PATH);

        debug!("Requesting {} records from {}", limit, url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(|e| HttpError::from_reqwest(&url, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::Unauthorized {
                status: status.as_u16(),
                message,
            }
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::UnexpectedStatus {
                url,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::from_reqwest(&url, e))?;

        let batch = PlaybackBatch::from_bytes(body.to_vec()).map_err(|e| HttpError::InvalidResponse {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        if batch.len() > spotify::MAX_RECENTLY_PLAYED_LIMIT as usize {
            return Err(HttpError::InvalidResponse {
                url,
                reason: format!("expected at most {} items, got {}", limit, batch.len()),
            }
            .into());
        }

        info!(
            "Fetched {} playback records (newest {:?})",
            batch.len(),
            batch.newest_played_at()
        );
        Ok(batch)
    }
}

//! Non-interactive authorization against the Spotify accounts service
//!
//! The token cache is a JSON file holding the last access token, its expiry
//! and the refresh token. Scheduled runs only ever read and refresh it; the
//! authorization-code exchange is a one-off bootstrap done from the CLI.

use chrono::Utc;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, SpotifyCredentials};
use crate::constants::spotify::TOKEN_EXPIRY_MARGIN_SECONDS;
use crate::errors::{AuthError, HttpError, LocalFsError, PipelineResult};

/// Contents of the on-disk token cache
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
    pub expires_at: i64,
    pub refresh_token: Option<String>,
}

impl fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenInfo")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl TokenInfo {
    pub fn is_expired(&self, now_ts: i64) -> bool {
        self.expires_at - TOKEN_EXPIRY_MARGIN_SECONDS < now_ts
    }

    pub fn has_scope(&self, required: &str) -> bool {
        let granted: Vec<&str> = self.scope.split_whitespace().collect();
        required.split_whitespace().all(|s| granted.contains(&s))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
    #[serde(default)]
    scope: Option<String>,
    refresh_token: Option<String>,
}

pub struct SpotifyAuth {
    client: Client,
    credentials: SpotifyCredentials,
    redirect_uri: String,
    scope: String,
    accounts_base_url: String,
    cache_path: PathBuf,
}

impl SpotifyAuth {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            credentials: config.credentials.clone(),
            redirect_uri: config.spotify.redirect_uri.clone(),
            scope: config.spotify.scope.clone(),
            accounts_base_url: config.spotify.accounts_base_url.trim_end_matches('/').to_string(),
            cache_path: config.token_cache_path(),
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// URL the operator opens once to grant access
    pub fn authorize_url(&self) -> anyhow::Result<String> {
        let mut url = Url::parse(&format!("{}/authorize", self.accounts_base_url))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scope);
        Ok(url.to_string())
    }

    /// Exchange an authorization code and persist the resulting token cache
    #[instrument(skip(self, code))]
    pub async fn exchange_code(&self, code: &str) -> PipelineResult<TokenInfo> {
        let token = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await?;
        self.save_cache(&token).await?;
        info!("Stored new token cache at {}", self.cache_path.display());
        Ok(token)
    }

    /// Valid bearer token from the cache, refreshing it when it has expired
    #[instrument(skip(self))]
    pub async fn access_token(&self) -> PipelineResult<String> {
        if !self.credentials.is_complete() {
            return Err(AuthError::MissingCredentials {
                field: "client_id/client_secret".to_string(),
            }
            .into());
        }

        let cached = self.load_cache().await?.ok_or_else(|| AuthError::NoCachedToken {
            cache_path: self.cache_path.display().to_string(),
        })?;

        if !cached.has_scope(&self.scope) {
            return Err(AuthError::InsufficientScope {
                required: self.scope.clone(),
                granted: cached.scope.clone(),
            }
            .into());
        }

        if !cached.is_expired(Utc::now().timestamp()) {
            debug!("Using cached access token (expires_at {})", cached.expires_at);
            return Ok(cached.access_token);
        }

        let refresh_token = cached.refresh_token.clone().ok_or_else(|| AuthError::NoCachedToken {
            cache_path: self.cache_path.display().to_string(),
        })?;

        info!("Cached access token expired, refreshing");
        let mut refreshed = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .await?;

        // The accounts service may omit these on refresh
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token);
        }
        if refreshed.scope.is_empty() {
            refreshed.scope = cached.scope;
        }

        self.save_cache(&refreshed).await?;
        Ok(refreshed.access_token)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> PipelineResult<TokenInfo> {
        let url = format!("{}/api/token", self.accounts_base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| HttpError::from_reqwest(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            warn!("Token request rejected with {}", status);
            return Err(AuthError::TokenRequestRejected {
                status: status.as_u16(),
                reason,
            }
            .into());
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| HttpError::from_reqwest(&url, e))?;

        Ok(TokenInfo {
            access_token: body.access_token,
            token_type: body.token_type,
            expires_in: body.expires_in,
            scope: body.scope.unwrap_or_default(),
            expires_at: Utc::now().timestamp() + body.expires_in,
            refresh_token: body.refresh_token,
        })
    }

    async fn load_cache(&self) -> PipelineResult<Option<TokenInfo>> {
        let path = self.cache_path.display().to_string();
        let content = match tokio::fs::read_to_string(&self.cache_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LocalFsError::ReadFailed {
                    path,
                    reason: e.to_string(),
                }
                .into())
            }
        };

        match serde_json::from_str::<TokenInfo>(&content) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!("Ignoring unreadable token cache {}: {}", path, e);
                Ok(None)
            }
        }
    }

    async fn save_cache(&self, token: &TokenInfo) -> PipelineResult<()> {
        let path = self.cache_path.display().to_string();
        let content = serde_json::to_vec(token).map_err(|e| LocalFsError::WriteFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        crate::stages::fetch::write_atomically(&self.cache_path, &content).await
    }
}

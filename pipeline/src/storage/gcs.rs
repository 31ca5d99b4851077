//! Google Cloud Storage object store over the JSON API
//!
//! Authentication is a bearer token: either a static one from secrets or one
//! fetched (and cached until shortly before expiry) from the instance
//! metadata server.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{validate_key, ObjectStore};
use crate::config::StorageConfig;
use crate::constants::{gcs, http};
use crate::errors::StorageError;

enum TokenSource {
    Static(String),
    MetadataServer {
        url: String,
        cached: Mutex<Option<(String, i64)>>,
    },
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectResource>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectResource {
    name: String,
}

#[derive(Deserialize)]
struct RewriteResponse {
    done: bool,
    #[serde(rename = "rewriteToken")]
    rewrite_token: Option<String>,
}

pub struct GcsObjectStore {
    client: Client,
    base_url: Url,
    bucket: String,
    token: TokenSource,
}

impl GcsObjectStore {
    pub fn new(storage: &StorageConfig, access_token: Option<String>) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(http::REQUEST_TIMEOUT)
            .connect_timeout(http::CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Configuration {
                reason: e.to_string(),
            })?;

        let base_url = Url::parse(&storage.gcs_base_url).map_err(|e| StorageError::Configuration {
            reason: format!("invalid gcs_base_url '{}': {}", storage.gcs_base_url, e),
        })?;

        let token = match access_token {
            Some(token) => TokenSource::Static(token),
            None => TokenSource::MetadataServer {
                url: storage.gcs_token_url.clone(),
                cached: Mutex::new(None),
            },
        };

        Ok(Self {
            client,
            base_url,
            bucket: storage.bucket.clone(),
            token,
        })
    }

    async fn bearer(&self) -> Result<String, StorageError> {
        match &self.token {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::MetadataServer { url, cached } => {
                let mut cached = cached.lock().await;
                let now = Utc::now().timestamp();
                if let Some((token, expires_at)) = cached.as_ref() {
                    if *expires_at - 60 > now {
                        return Ok(token.clone());
                    }
                }

                debug!("Fetching storage access token from metadata server");
                let response = self
                    .client
                    .get(url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(StorageError::from_reqwest)?;
                let response = Self::check(response, "token").await?;
                let token: MetadataToken = response.json().await.map_err(StorageError::from_reqwest)?;

                *cached = Some((token.access_token.clone(), now + token.expires_in));
                Ok(token.access_token)
            }
        }
    }

    /// `{base}/{segments...}` with every segment percent-encoded (object names keep their `/` as `%2F`)
    fn url(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::Configuration {
                reason: format!("gcs_base_url '{}' cannot be a base", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, key: &str) -> Result<Url, StorageError> {
        self.url(&["storage", "v1", "b", &self.bucket, "o", key])
    }

    async fn check(response: Response, operation: &str) -> Result<Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => StorageError::NotFound { key: body },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::PermissionDenied {
                key: operation.to_string(),
                reason: format!("{}: {}", status, body),
            },
            _ => StorageError::Provider {
                operation: operation.to_string(),
                reason: format!("{}: {}", status, body),
            },
        })
    }

    fn with_key(err: StorageError, key: &str) -> StorageError {
        match err {
            StorageError::NotFound { .. } => StorageError::NotFound {
                key: key.to_string(),
            },
            StorageError::PermissionDenied { reason, .. } => StorageError::PermissionDenied {
                key: key.to_string(),
                reason,
            },
            other => other,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    #[instrument(skip(self, local_path), fields(bucket = %self.bucket))]
    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let body = tokio::fs::read(local_path).await?;

        let mut url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);

        let response = self
            .client
            .post(url)
            .bearer_auth(self.bearer().await?)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(StorageError::from_reqwest)?;
        Self::check(response, "upload")
            .await
            .map_err(|e| Self::with_key(e, key))?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        let mut url = self.object_url(key)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self
            .client
            .get(url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(StorageError::from_reqwest)?;
        let response = Self::check(response, "read")
            .await
            .map_err(|e| Self::with_key(e, key))?;
        let bytes = response.bytes().await.map_err(StorageError::from_reqwest)?;
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.url(&["storage", "v1", "b", &self.bucket, "o"])?;
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("prefix", prefix)
                    .append_pair("maxResults", &gcs::LIST_PAGE_SIZE.to_string())
                    .append_pair("fields", "items(name),nextPageToken");
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self
                .client
                .get(url)
                .bearer_auth(self.bearer().await?)
                .send()
                .await
                .map_err(StorageError::from_reqwest)?;
            let page: ListResponse = Self::check(response, "list")
                .await?
                .json()
                .await
                .map_err(StorageError::from_reqwest)?;

            keys.extend(page.items.into_iter().map(|o| o.name));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        let response = self
            .client
            .get(self.object_url(key)?)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(StorageError::from_reqwest)?;
        match Self::check(response, "exists").await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(Self::with_key(e, key)),
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        validate_key(src)?;
        validate_key(dst)?;
        let mut rewrite_token: Option<String> = None;

        // Rewrite may need several calls for large objects
        loop {
            let mut url = self.url(&[
                "storage", "v1", "b", &self.bucket, "o", src, "rewriteTo", "b", &self.bucket, "o", dst,
            ])?;
            if let Some(token) = &rewrite_token {
                url.query_pairs_mut().append_pair("rewriteToken", token);
            }

            let response = self
                .client
                .post(url)
                .bearer_auth(self.bearer().await?)
                .send()
                .await
                .map_err(StorageError::from_reqwest)?;
            let rewrite: RewriteResponse = Self::check(response, "copy")
                .await
                .map_err(|e| Self::with_key(e, src))?
                .json()
                .await
                .map_err(StorageError::from_reqwest)?;

            if rewrite.done {
                return Ok(());
            }
            rewrite_token = rewrite.rewrite_token;
            if rewrite_token.is_none() {
                return Err(StorageError::Provider {
                    operation: "copy".to_string(),
                    reason: "rewrite not done but no rewriteToken returned".to_string(),
                });
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let response = self
            .client
            .delete(self.object_url(key)?)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(StorageError::from_reqwest)?;
        Self::check(response, "delete")
            .await
            .map_err(|e| Self::with_key(e, key))?;
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn store_type(&self) -> &'static str {
        "gcs"
    }
}

//! Error types for the pipeline stages
//!
//! Every stage failure falls into one of four categories: upstream
//! authentication, network transport, local filesystem, or object storage.
//! Any of them fails the run.

use std::fmt;

/// Main error type returned by pipeline stages
#[derive(Debug)]
pub enum PipelineError {
    /// Authentication/authorization against the upstream API
    Auth(AuthError),

    /// Network or transport failure talking to the upstream API
    Http(HttpError),

    /// Local filesystem failure (scratch file, token cache)
    LocalFs(LocalFsError),

    /// Object storage failure (upload, list, copy, delete)
    Storage(StorageError),
}

/// Authentication error variants
#[derive(Debug)]
pub enum AuthError {
    /// No usable token cache on disk; the cache must be bootstrapped first
    NoCachedToken { cache_path: String },

    /// The accounts service rejected the refresh or code exchange
    TokenRequestRejected { status: u16, reason: String },

    /// Cached token does not grant the scope we need
    InsufficientScope { required: String, granted: String },

    /// The API answered 401/403
    Unauthorized { status: u16, message: String },

    /// Client credentials are missing or empty
    MissingCredentials { field: String },
}

/// Upstream HTTP error variants
#[derive(Debug)]
pub enum HttpError {
    /// Request could not be sent or the connection dropped
    Transport { url: String, reason: String },

    /// Request timed out
    Timeout { url: String },

    /// Non-success status that is not an auth failure
    UnexpectedStatus { url: String, status: u16, body: String },

    /// Response body could not be decoded
    InvalidResponse { url: String, reason: String },
}

/// Local filesystem error variants
#[derive(Debug)]
pub enum LocalFsError {
    /// Failed to read a file
    ReadFailed { path: String, reason: String },

    /// Failed to write a file
    WriteFailed { path: String, reason: String },

    /// A file the stage depends on is missing
    Missing { path: String },
}

/// Object storage error variants
#[derive(Debug)]
pub enum StorageError {
    /// Object does not exist
    NotFound { key: String },

    /// Object already exists and must not be overwritten
    AlreadyExists { key: String },

    /// Credentials rejected for the bucket
    PermissionDenied { key: String, reason: String },

    /// Transport failure talking to the store
    Network { reason: String },

    /// Store returned an error
    Provider { operation: String, reason: String },

    /// Local I/O behind the store failed
    Io { reason: String },

    /// Object key is not valid for the store
    InvalidKey { key: String },

    /// Backend misconfigured
    Configuration { reason: String },
}

impl PipelineError {
    /// Short category label used in run records and alerts
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Auth(_) => "auth",
            PipelineError::Http(_) => "http",
            PipelineError::LocalFs(_) => "local_fs",
            PipelineError::Storage(_) => "storage",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Auth(e) => write!(f, "Authentication error: {}", e),
            PipelineError::Http(e) => write!(f, "HTTP error: {}", e),
            PipelineError::LocalFs(e) => write!(f, "Local filesystem error: {}", e),
            PipelineError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::NoCachedToken { cache_path } => {
                write!(
                    f,
                    "No cached token at '{}'; run `pipeline auth-url` and `pipeline auth-exchange` first",
                    cache_path
                )
            }
            AuthError::TokenRequestRejected { status, reason } => {
                write!(f, "Token request rejected ({}): {}", status, reason)
            }
            AuthError::InsufficientScope { required, granted } => {
                write!(
                    f,
                    "Token scope '{}' does not include required scope '{}'",
                    granted, required
                )
            }
            AuthError::Unauthorized { status, message } => {
                write!(f, "API rejected credentials ({}): {}", status, message)
            }
            AuthError::MissingCredentials { field } => {
                write!(f, "Missing credential: {}", field)
            }
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::Transport { url, reason } => {
                write!(f, "Request to {} failed: {}", url, reason)
            }
            HttpError::Timeout { url } => write!(f, "Request to {} timed out", url),
            HttpError::UnexpectedStatus { url, status, body } => {
                write!(f, "Unexpected status {} from {}: {}", status, url, body)
            }
            HttpError::InvalidResponse { url, reason } => {
                write!(f, "Invalid response from {}: {}", url, reason)
            }
        }
    }
}

impl fmt::Display for LocalFsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalFsError::ReadFailed { path, reason } => {
                write!(f, "Failed to read '{}': {}", path, reason)
            }
            LocalFsError::WriteFailed { path, reason } => {
                write!(f, "Failed to write '{}': {}", path, reason)
            }
            LocalFsError::Missing { path } => write!(f, "File '{}' does not exist", path),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound { key } => write!(f, "Object not found: {}", key),
            StorageError::AlreadyExists { key } => write!(f, "Object already exists: {}", key),
            StorageError::PermissionDenied { key, reason } => {
                write!(f, "Permission denied for '{}': {}", key, reason)
            }
            StorageError::Network { reason } => write!(f, "Network error: {}", reason),
            StorageError::Provider { operation, reason } => {
                write!(f, "{} failed: {}", operation, reason)
            }
            StorageError::Io { reason } => write!(f, "IO error: {}", reason),
            StorageError::InvalidKey { key } => write!(f, "Invalid object key: '{}'", key),
            StorageError::Configuration { reason } => {
                write!(f, "Storage misconfigured: {}", reason)
            }
        }
    }
}

impl std::error::Error for PipelineError {}
impl std::error::Error for AuthError {}
impl std::error::Error for HttpError {}
impl std::error::Error for LocalFsError {}
impl std::error::Error for StorageError {}

impl From<AuthError> for PipelineError {
    fn from(err: AuthError) -> Self {
        PipelineError::Auth(err)
    }
}

impl From<HttpError> for PipelineError {
    fn from(err: HttpError) -> Self {
        PipelineError::Http(err)
    }
}

impl From<LocalFsError> for PipelineError {
    fn from(err: LocalFsError) -> Self {
        PipelineError::LocalFs(err)
    }
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        PipelineError::Storage(err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound {
                key: err.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                key: String::new(),
                reason: err.to_string(),
            },
            _ => StorageError::Io {
                reason: err.to_string(),
            },
        }
    }
}

impl HttpError {
    /// Classify a reqwest failure for the given URL
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_decode() {
            HttpError::InvalidResponse {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            HttpError::Transport {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

impl StorageError {
    /// Map a reqwest transport failure
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        StorageError::Network {
            reason: err.to_string(),
        }
    }
}

/// Result alias for stage code
pub type PipelineResult<T> = Result<T, PipelineError>;

//! Central repository for pipeline constants and defaults
//!
//! Organized by category so timeouts, limits and well-known names live in one place.

use std::time::Duration;

/// Spotify Web API constants
pub mod spotify {
    /// Base URL of the Web API
    pub const API_BASE_URL: &str = "https://api.spotify.com";

    /// Base URL of the accounts service (authorize + token endpoints)
    pub const ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";

    /// Path of the recently-played endpoint
    pub const RECENTLY_PLAYED_PATH: &str = "/v1/me/player/recently-played";

    /// Scope required to read playback history
    pub const RECENTLY_PLAYED_SCOPE: &str = "user-read-recently-played";

    /// Hard upper bound the API accepts for `limit`
    pub const MAX_RECENTLY_PLAYED_LIMIT: u32 = 50;

    /// Redirect target registered with the Spotify application
    pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000";

    /// Default on-disk token cache
    pub const DEFAULT_TOKEN_CACHE_PATH: &str = ".cache";

    /// Refresh the access token this many seconds before it actually expires
    pub const TOKEN_EXPIRY_MARGIN_SECONDS: i64 = 60;
}

/// HTTP client timeout constants
pub mod http {
    use super::Duration;

    /// Default timeout for API and storage requests
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Timeout for establishing HTTP connections
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Alert webhook request timeout
    pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Google Cloud Storage constants
pub mod gcs {
    /// JSON API base URL
    pub const BASE_URL: &str = "https://storage.googleapis.com";

    /// Metadata server token endpoint used when no static token is configured
    pub const METADATA_TOKEN_URL: &str =
        "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

    /// Page size for object listing
    pub const LIST_PAGE_SIZE: u32 = 1000;
}

/// Workflow defaults
pub mod workflow {
    /// Identifier of the single workflow this service runs
    pub const DEFAULT_WORKFLOW_ID: &str = "spotify-recently-played-v2";

    /// Default owner label
    pub const DEFAULT_OWNER: &str = "oli";

    /// Default schedule preset
    pub const DEFAULT_SCHEDULE: &str = "@hourly";

    /// First logical date a run may have
    pub const DEFAULT_START_DATE: &str = "2022-11-17T14:00:00Z";

    /// Stage retries (explicit zero-retry policy)
    pub const DEFAULT_RETRIES: u32 = 0;

    /// Delay between stage retries, unused at zero retries
    pub const DEFAULT_RETRY_DELAY_SECONDS: u64 = 120;

    /// Default bucket
    pub const DEFAULT_BUCKET: &str = "quantafy-spotify-data";

    /// Staging prefix for freshly uploaded artifacts
    pub const SOURCE_PREFIX: &str = "source";

    /// Date-partitioned archive prefix
    pub const RAW_PREFIX: &str = "raw";

    /// Default scratch file
    pub const DEFAULT_SCRATCH_FILE: &str = "data/spotify.json";

    /// Default run history database
    pub const DEFAULT_DATABASE_PATH: &str = "data/pipeline.db";
}

/// Stage identifiers, shared by the runner, the database and the API
pub mod stages {
    pub const FETCH: &str = "query_spotify";
    pub const UPLOAD: &str = "save_local_file_to_source";
    pub const ARCHIVE: &str = "move_source_to_raw";
}

/// Cleanup constants
pub mod cleanup {
    /// Hours after which a held run lease is considered stuck
    pub const STALE_RUN_HOURS: i64 = 2;

    /// Interval between lease cleanup passes
    pub const CLEANUP_INTERVAL_SECONDS: u64 = 600;
}

/// Limits
pub mod limits {
    /// Default number of runs returned by the history endpoint
    pub const DEFAULT_RUN_HISTORY: i64 = 25;

    /// Maximum number of runs returned by the history endpoint
    pub const MAX_RUN_HISTORY: i64 = 500;
}

/// Web server defaults
pub mod web {
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 8095;
}

//! Common test data and constants

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

/// Logical date of the reference run and the keys it produces
pub mod reference_run {
    pub const UNIX_TS: i64 = 1_709_634_000;
    pub const SOURCE_KEY: &str = "source/1709634000.json";
    pub const RAW_KEY: &str = "raw/2024/3/5/1709634000.json";
    pub const RAW_PREFIX: &str = "raw/2024/3/5/";
}

pub mod tokens {
    pub const ACCESS_TOKEN: &str = "test-access-token";
    pub const REFRESHED_ACCESS_TOKEN: &str = "refreshed-access-token";
    pub const REFRESH_TOKEN: &str = "test-refresh-token";
    pub const GCS_TOKEN: &str = "test-gcs-token";
    pub const SCOPE: &str = "user-read-recently-played";
}

pub mod credentials {
    pub const CLIENT_ID: &str = "test-client-id";
    pub const CLIENT_SECRET: &str = "test-client-secret";
}

pub const BUCKET: &str = "test-bucket";
pub const WORKFLOW_ID: &str = "spotify-recently-played-test";

pub fn reference_logical_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 0).unwrap()
}

/// Recently-played response with `count` items, newest first
pub fn recently_played_payload(count: usize) -> Value {
    let newest = reference_logical_date() - Duration::minutes(1);
    let items: Vec<Value> = (0..count)
        .map(|i| {
            let played_at = newest - Duration::minutes(4 * i as i64);
            json!({
                "track": {
                    "id": format!("track{:03}", i),
                    "name": format!("Test Track {}", i),
                    "duration_ms": 180_000 + i as i64 * 1000,
                    "artists": [{ "id": format!("artist{:02}", i % 7), "name": format!("Artist {}", i % 7) }],
                    "album": { "id": format!("album{:02}", i % 5), "name": format!("Album {}", i % 5) }
                },
                "played_at": played_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                "context": null
            })
        })
        .collect();

    json!({
        "items": items,
        "next": "https://api.spotify.com/v1/me/player/recently-played?before=1709633760000&limit=50",
        "cursors": { "after": "1709633940000", "before": "1709630000000" },
        "limit": 50,
        "href": "https://api.spotify.com/v1/me/player/recently-played?limit=50"
    })
}

/// Token cache document as written by the auth bootstrap
pub fn token_cache(access_token: &str, expires_at: i64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": tokens::SCOPE,
        "expires_at": expires_at,
        "refresh_token": tokens::REFRESH_TOKEN
    })
}

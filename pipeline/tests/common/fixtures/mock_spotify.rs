//! Mock Spotify Web API and accounts service

use serde_json::{json, Value};
use wiremock::{
    matchers::{body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

use super::test_data::tokens;

pub const RECENTLY_PLAYED_PATH: &str = "/v1/me/player/recently-played";
pub const TOKEN_PATH: &str = "/api/token";

/// One server stands in for both api.spotify.com and accounts.spotify.com
pub struct MockSpotifyServer {
    pub server: MockServer,
}

impl MockSpotifyServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Serve `payload` for `limit=50` requests carrying `access_token`
    pub async fn mock_recently_played(&self, access_token: &str, payload: Value) {
        Mock::given(method("GET"))
            .and(path(RECENTLY_PLAYED_PATH))
            .and(query_param("limit", "50"))
            .and(header("authorization", format!("Bearer {}", access_token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(payload))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_recently_played_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(RECENTLY_PLAYED_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": { "status": status, "message": "mocked failure" }
            })))
            .mount(&self.server)
            .await;
    }

    /// Accept refresh-token grants and hand out `new_access_token`
    pub async fn mock_token_refresh(&self, new_access_token: &str) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains(tokens::REFRESH_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": new_access_token,
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": tokens::SCOPE
            })))
            .mount(&self.server)
            .await;
    }

    /// Accept authorization-code grants for `code`
    pub async fn mock_code_exchange(&self, code: &str, access_token: &str) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains(code))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": tokens::SCOPE,
                "refresh_token": tokens::REFRESH_TOKEN
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_token_rejected(&self) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Refresh token revoked"
            })))
            .mount(&self.server)
            .await;
    }

    /// Query strings of every recently-played request received so far
    pub async fn recently_played_queries(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == RECENTLY_PLAYED_PATH)
            .map(|r| r.url.query().unwrap_or_default().to_string())
            .collect()
    }

    pub async fn token_requests(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == TOKEN_PATH)
            .count()
    }
}

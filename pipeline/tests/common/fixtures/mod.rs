//! Reusable test utilities:
//! - Mock HTTP servers (Spotify, GCS, alert webhook)
//! - A config builder writing TOML into a temp directory
//! - Sample payloads and shared constants

// Not every test binary uses every fixture
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod mock_gcs;
pub mod mock_spotify;
pub mod mock_webhook;
pub mod test_config;
pub mod test_data;

pub use mock_gcs::MockGcsServer;
pub use mock_spotify::MockSpotifyServer;
pub use mock_webhook::MockWebhookServer;
pub use test_config::{TestConfigBuilder, TestEnv, TestPipeline};
pub use test_data::*;

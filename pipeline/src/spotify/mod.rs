//! Spotify Web API access: token cache handling and the playback history call

pub mod auth;
pub mod client;
pub mod models;

pub use auth::{SpotifyAuth, TokenInfo};
pub use client::SpotifyClient;
pub use models::{PlayHistoryItem, PlaybackBatch, TrackRef};

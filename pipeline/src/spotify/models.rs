//! Playback history payloads
//!
//! The response body is kept as received and written out unchanged. The
//! typed view only exists for logging; items it cannot read are skipped
//! rather than failing the fetch.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayHistoryItem {
    #[serde(default)]
    pub track: Option<TrackRef>,
    #[serde(default)]
    pub played_at: Option<String>,
}

impl PlayHistoryItem {
    pub fn played_at(&self) -> Option<DateTime<Utc>> {
        self.played_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlayHistoryView {
    #[serde(default)]
    items: Vec<Value>,
}

/// One fetched batch of recently-played records
#[derive(Debug, Clone)]
pub struct PlaybackBatch {
    body: Vec<u8>,
    record_count: usize,
    items: Vec<PlayHistoryItem>,
}

impl PlaybackBatch {
    /// Wrap a response body. Fails only if the body is not a JSON document.
    pub fn from_bytes(body: Vec<u8>) -> Result<Self, serde_json::Error> {
        let view: PlayHistoryView = serde_json::from_slice(&body)?;
        let record_count = view.items.len();
        let items = view
            .items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();

        Ok(Self {
            body,
            record_count,
            items,
        })
    }

    /// Response body exactly as received
    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn items(&self) -> &[PlayHistoryItem] {
        &self.items
    }

    /// Number of entries in `items`, readable or not
    pub fn len(&self) -> usize {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn newest_played_at(&self) -> Option<DateTime<Utc>> {
        self.items.iter().filter_map(|i| i.played_at()).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_is_kept_byte_for_byte() {
        let body = br#"{"next":"https://api.spotify.com/v1/me/player/recently-played?before=1","items":[
            {"track":{"name":"First","id":"t1","duration_ms":1000},"played_at":"2024-03-05T09:58:00.000Z","context":null},
            {"track":{"name":"Second","id":"t2"},"played_at":"2024-03-05T09:40:00.000Z"}
        ],"limit":50}"#
            .to_vec();

        let batch = PlaybackBatch::from_bytes(body.clone()).unwrap();

        assert_eq!(batch.as_bytes(), body.as_slice());
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.items()[0].track.as_ref().unwrap().id.as_deref(),
            Some("t1")
        );
        assert_eq!(
            batch.newest_played_at().unwrap().to_rfc3339(),
            "2024-03-05T09:58:00+00:00"
        );
    }

    #[test]
    fn test_incomplete_items_do_not_fail_the_batch() {
        let body = br#"{"items":[
            {"track":{"id":"local-file"},"played_at":"2024-03-05T09:58:00Z"},
            {"track":null,"played_at":"not a timestamp"},
            {"played_at":"2024-03-05T09:10:00Z"},
            42
        ]}"#
            .to_vec();

        let batch = PlaybackBatch::from_bytes(body).unwrap();

        assert_eq!(batch.len(), 4);
        assert_eq!(batch.items().len(), 3);
        assert_eq!(
            batch.newest_played_at().unwrap().to_rfc3339(),
            "2024-03-05T09:58:00+00:00"
        );
    }

    #[test]
    fn test_empty_history() {
        let batch = PlaybackBatch::from_bytes(br#"{"items": []}"#.to_vec()).unwrap();
        assert!(batch.is_empty());
        assert!(batch.newest_played_at().is_none());
    }

    #[test]
    fn test_non_json_body_is_rejected() {
        assert!(PlaybackBatch::from_bytes(b"<html>".to_vec()).is_err());
    }
}

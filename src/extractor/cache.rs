//! Playback URL cache with single-flight resolution per video id.
//!
//! Owned by a serialized actor (a `tokio::sync::Mutex`-guarded map), as
//! SPEC_FULL.md §5 requires: mutations are strictly single-threaded, and two
//! concurrent `resolve()` calls for the same id must not both hit the
//! network (SPEC_FULL.md §8, "Extractor idempotence").

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use super::player_api::PlaybackUrlRecord;

#[derive(Default)]
pub struct PlaybackUrlCache {
    entries: Mutex<HashMap<String, PlaybackUrlRecord>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PlaybackUrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cached, non-expired record if one exists.
    pub async fn get(&self, video_id: &str) -> Option<PlaybackUrlRecord> {
        let entries = self.entries.lock().await;
        entries
            .get(video_id)
            .filter(|record| !record.is_expired(Utc::now()))
            .cloned()
    }

    pub async fn insert(&self, video_id: String, record: PlaybackUrlRecord) {
        self.entries.lock().await.insert(video_id, record);
    }

    pub async fn invalidate(&self, video_id: &str) {
        self.entries.lock().await.remove(video_id);
    }

    /// Acquire the per-video-id single-flight lock. While this guard is
    /// held, other callers resolving the same video id will queue behind
    /// it rather than racing the remote; once it is dropped, callers should
    /// re-check `get()` before issuing a fresh network resolve, since the
    /// holder may have already populated the cache.
    pub async fn single_flight_guard(&self, video_id: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight
            .entry(video_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(url: &str) -> PlaybackUrlRecord {
        PlaybackUrlRecord::new(url.into(), 140, "audio/mp4".into(), 128_000, "test-cpn-0000".into())
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let cache = PlaybackUrlCache::new();
        cache.insert("abc123".into(), sample_record("http://x")).await;
        let got = cache.get("abc123").await.unwrap();
        assert_eq!(got.url, "http://x");
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = PlaybackUrlCache::new();
        cache.insert("abc123".into(), sample_record("http://x")).await;
        cache.invalidate("abc123").await;
        assert!(cache.get("abc123").await.is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let cache = PlaybackUrlCache::new();
        let mut record = sample_record("http://x");
        record.expires_at = Utc::now() - chrono::Duration::seconds(1);
        cache.insert("abc123".into(), record).await;
        assert!(cache.get("abc123").await.is_none());
    }

    #[tokio::test]
    async fn single_flight_guard_is_shared_per_key() {
        let cache = PlaybackUrlCache::new();
        let a = cache.single_flight_guard("abc123").await;
        let b = cache.single_flight_guard("abc123").await;
        assert!(Arc::ptr_eq(&a, &b));
    }
}

//! Response shapes consumed from the remote `/player` endpoint and the
//! adaptive-format filter that picks a playable audio track.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PlayerResponse {
    #[serde(rename = "playabilityStatus")]
    pub playability_status: PlayabilityStatus,
    #[serde(rename = "streamingData")]
    pub streaming_data: Option<StreamingData>,
}

#[derive(Debug, Deserialize)]
pub struct PlayabilityStatus {
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamingData {
    #[serde(rename = "adaptiveFormats", default)]
    pub adaptive_formats: Vec<AdaptiveFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdaptiveFormat {
    pub itag: u32,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub bitrate: Option<u64>,
    pub url: Option<String>,
    #[serde(rename = "signatureCipher")]
    pub signature_cipher: Option<String>,
    pub cipher: Option<String>,
    pub width: Option<u32>,
}

impl AdaptiveFormat {
    /// Audio-only MP4/M4A, not WebM/Opus, with exactly one of `url` or a
    /// cipher present (SPEC_FULL.md §6).
    pub fn is_playable_audio(&self) -> bool {
        if self.width.is_some() {
            return false;
        }
        let mime = self.mime_type.to_ascii_lowercase();
        let is_mp4_family = mime.contains("audio/mp4") || mime.contains("audio/m4a");
        let is_excluded = mime.contains("webm") || mime.contains("opus");
        if !is_mp4_family || is_excluded {
            return false;
        }
        let has_direct_url = self.url.is_some();
        let has_cipher = self.signature_cipher.is_some();
        has_direct_url ^ has_cipher
    }

    pub fn needs_deobfuscation(&self) -> bool {
        self.url.is_none() && self.signature_cipher.is_some()
    }
}

/// Pick the highest-bitrate playable audio format, if any.
pub fn select_best_format(formats: &[AdaptiveFormat]) -> Option<&AdaptiveFormat> {
    formats
        .iter()
        .filter(|f| f.is_playable_audio())
        .max_by_key(|f| f.bitrate.unwrap_or(0))
}

/// Cached, fully-resolved playback URL for a single video id.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackUrlRecord {
    pub url: String,
    pub itag: u32,
    pub mime_type: String,
    pub bitrate: u64,
    pub playback_headers: HashMap<String, String>,
    pub expires_at: DateTime<Utc>,
    pub cpn: String,
}

impl PlaybackUrlRecord {
    /// Derive `expires_at` from the URL's `expire=` query parameter minus a
    /// 5-minute safety margin, or 5 hours from now if absent. `cpn` must be
    /// the same nonce already appended to `url`'s `cpn=` query parameter.
    pub fn new(url: String, itag: u32, mime_type: String, bitrate: u64, cpn: String) -> Self {
        let expires_at = parse_expiry(&url).unwrap_or_else(|| Utc::now() + ChronoDuration::hours(5));
        Self {
            url,
            itag,
            mime_type,
            bitrate,
            playback_headers: HashMap::new(),
            expires_at,
            cpn,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn with_url(mut self, url: String) -> Self {
        self.expires_at =
            parse_expiry(&url).unwrap_or_else(|| Utc::now() + ChronoDuration::hours(5));
        self.url = url;
        self
    }
}

fn parse_expiry(url: &str) -> Option<DateTime<Utc>> {
    let query = url.split('?').nth(1)?;
    for pair in query.split('&') {
        let mut kv = pair.splitn(2, '=');
        let key = kv.next()?;
        let value = kv.next()?;
        if key == "expire" {
            let epoch_secs: i64 = value.parse().ok()?;
            let expiry = DateTime::from_timestamp(epoch_secs, 0)?;
            return Some(expiry - ChronoDuration::minutes(5));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(mime: &str, url: Option<&str>, cipher: Option<&str>, width: Option<u32>) -> AdaptiveFormat {
        AdaptiveFormat {
            itag: 140,
            mime_type: mime.to_string(),
            bitrate: Some(128_000),
            url: url.map(str::to_string),
            signature_cipher: cipher.map(str::to_string),
            cipher: None,
            width,
        }
    }

    #[test]
    fn accepts_direct_audio_mp4() {
        let f = fmt("audio/mp4; codecs=\"mp4a.40.2\"", Some("http://x"), None, None);
        assert!(f.is_playable_audio());
    }

    #[test]
    fn rejects_video_formats() {
        let f = fmt("audio/mp4", Some("http://x"), None, Some(1920));
        assert!(!f.is_playable_audio());
    }

    #[test]
    fn rejects_webm_and_opus() {
        let f = fmt("audio/webm; codecs=\"opus\"", Some("http://x"), None, None);
        assert!(!f.is_playable_audio());
    }

    #[test]
    fn rejects_formats_with_both_or_neither_url_and_cipher() {
        let both = fmt("audio/mp4", Some("http://x"), Some("s=abc"), None);
        assert!(!both.is_playable_audio());
        let neither = fmt("audio/mp4", None, None, None);
        assert!(!neither.is_playable_audio());
    }

    #[test]
    fn selects_highest_bitrate() {
        let low = fmt("audio/mp4", Some("http://low"), None, None);
        let mut high = fmt("audio/mp4", Some("http://high"), None, None);
        high.bitrate = Some(256_000);
        let formats = vec![low, high.clone()];
        let best = select_best_format(&formats).unwrap();
        assert_eq!(best.url.as_deref(), Some("http://high"));
    }

    #[test]
    fn expiry_parsed_from_query_param() {
        let now = Utc::now();
        let epoch = now.timestamp() + 3600;
        let url = format!("http://example.com/videoplayback?itag=140&expire={epoch}");
        let record = PlaybackUrlRecord::new(url, 140, "audio/mp4".into(), 128_000, "test-cpn-0000".into());
        let expected = DateTime::from_timestamp(epoch, 0).unwrap() - ChronoDuration::minutes(5);
        assert_eq!(record.expires_at, expected);
    }

    #[test]
    fn defaults_to_five_hours_when_no_expire_param() {
        let before = Utc::now() + ChronoDuration::hours(5) - ChronoDuration::seconds(5);
        let record = PlaybackUrlRecord::new(
            "http://example.com/videoplayback".into(),
            140,
            "audio/mp4".into(),
            1,
            "test-cpn-0000".into(),
        );
        assert!(record.expires_at > before);
    }
}

//! Generic YAML config I/O plus the crate's two small config documents.
//!
//! Persistence of the per-key settings named in the external interface
//! (crossfade enabled/duration/premium, EQ settings, search history) is a
//! host responsibility (see `lib.rs` scope notes); the types here cover only
//! the engine/extractor-internal documents this crate owns end to end.

mod io;

pub use io::{load_config, save_config};

use serde::{Deserialize, Serialize};

/// Device/output preferences for the Audio Engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub preferred_device_name: Option<String>,
    pub buffer_size_frames: u32,
    pub mega_bass_auto_engage: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preferred_device_name: None,
            buffer_size_frames: 512,
            mega_bass_auto_engage: true,
        }
    }
}

/// Which optional Stream Extractor strategies/timeouts are enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub enable_web_strategy: bool,
    pub enable_proxy_fallback: bool,
    pub proxy_urls: Vec<String>,
    pub head_validation_timeout_secs: u64,
    pub js_player_fetch_timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            enable_web_strategy: true,
            enable_proxy_fallback: false,
            proxy_urls: Vec::new(),
            head_validation_timeout_secs: 5,
            js_player_fetch_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.buffer_size_frames, 512);
        assert!(c.mega_bass_auto_engage);
    }

    #[test]
    fn extractor_config_defaults() {
        let c = ExtractorConfig::default();
        assert_eq!(c.head_validation_timeout_secs, 5);
        assert!(!c.enable_proxy_fallback);
    }
}

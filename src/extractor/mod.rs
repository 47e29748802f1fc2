//! Stream Extractor: resolves a video id to a directly streamable URL.
//!
//! See SPEC_FULL.md §4.2, §6, §9 ("Dynamic JS evaluation").

mod cache;
mod cipher;
mod cpn;
mod error;
mod identity;
mod player_api;

pub use cache::PlaybackUrlCache;
pub use error::{ExtractorError, ExtractorResult};
pub use identity::ClientIdentity;
pub use player_api::{AdaptiveFormat, PlaybackUrlRecord, PlayerResponse};

use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::ExtractorConfig;

#[cfg(feature = "web-strategy")]
use cipher::{extract_artifacts, find_base_js_url, CompiledPlayer, PlayerArtifacts};

/// Consecutive `DeobfuscationFailure`s (across identities, within one
/// `resolve` call) that trigger dropping and re-scraping the player cache.
const DEOBFUSCATION_FAILURE_THRESHOLD: u32 = 2;

const PLAYER_API_URL: &str = "https://www.youtube.com/youtubei/v1/player?prettyPrint=false";
const EMBED_URL_PREFIX: &str = "https://www.youtube.com/embed/";
const DESKTOP_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Outcome of one successful resolve, including which strategy won (used by
/// the "strategy chain fallback" scenario in SPEC_FULL.md §8).
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub record: PlaybackUrlRecord,
    pub winning_strategy: &'static str,
    pub elapsed: Duration,
}

pub struct StreamExtractor {
    http: reqwest::Client,
    cache: PlaybackUrlCache,
    config: ExtractorConfig,
    #[cfg(feature = "web-strategy")]
    player_cache: Mutex<Option<(String, PlayerArtifacts)>>,
}

impl StreamExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(DESKTOP_USER_AGENT)
            .build()
            .expect("reqwest client construction should never fail with static config");
        Self {
            http,
            cache: PlaybackUrlCache::new(),
            config,
            #[cfg(feature = "web-strategy")]
            player_cache: Mutex::new(None),
        }
    }

    /// Resolve a video id to a playable URL, trying client identities in
    /// order and returning on the first validated URL. Single-flight and
    /// idempotent for concurrent callers of the same `video_id`.
    pub async fn resolve(&self, video_id: &str) -> ExtractorResult<ResolveOutcome> {
        let started = std::time::Instant::now();

        if let Some(record) = self.cache.get(video_id).await {
            return Ok(ResolveOutcome {
                record,
                winning_strategy: "cache",
                elapsed: started.elapsed(),
            });
        }

        let guard_handle = self.cache.single_flight_guard(video_id).await;
        let _permit = guard_handle.lock().await;

        // Another caller may have populated the cache while we waited.
        if let Some(record) = self.cache.get(video_id).await {
            return Ok(ResolveOutcome {
                record,
                winning_strategy: "cache",
                elapsed: started.elapsed(),
            });
        }

        let chain = ClientIdentity::default_chain(self.config.enable_web_strategy);
        let mut failure_reasons = Vec::new();
        let mut consecutive_deobfuscation_failures = 0u32;

        for identity in chain {
            match self.try_strategy(identity, video_id).await {
                Ok(record) => {
                    self.cache.insert(video_id.to_string(), record.clone()).await;
                    return Ok(ResolveOutcome {
                        record,
                        winning_strategy: identity.name(),
                        elapsed: started.elapsed(),
                    });
                }
                Err(e) => {
                    log::debug!("strategy {} failed for {}: {}", identity.name(), video_id, e);
                    if matches!(e, ExtractorError::DeobfuscationFailure(_)) {
                        consecutive_deobfuscation_failures += 1;
                        if consecutive_deobfuscation_failures >= DEOBFUSCATION_FAILURE_THRESHOLD {
                            log::debug!("repeated deobfuscation failures for {video_id}, dropping player cache");
                            self.invalidate_player_cache().await;
                            consecutive_deobfuscation_failures = 0;
                        }
                    } else {
                        consecutive_deobfuscation_failures = 0;
                    }
                    failure_reasons.push(format!("{}: {}", identity.name(), e));
                }
            }
        }

        Err(ExtractorError::AllStrategiesFailed(failure_reasons))
    }

    async fn try_strategy(
        &self,
        identity: ClientIdentity,
        video_id: &str,
    ) -> ExtractorResult<PlaybackUrlRecord> {
        let signature_timestamp = if identity.requires_deobfuscation() {
            self.signature_timestamp().await
        } else {
            None
        };

        let body = identity.player_request_body(video_id, signature_timestamp);
        let response = self
            .http
            .post(PLAYER_API_URL)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractorError::TransientNetwork(e.to_string()))?;

        if response.status().is_client_error() || response.status().is_server_error() {
            return Err(ExtractorError::RemoteRejection {
                status: response.status().to_string(),
                reason: "non-2xx from player API".to_string(),
            });
        }

        let parsed: PlayerResponse = response
            .json()
            .await
            .map_err(|e| ExtractorError::TransientNetwork(e.to_string()))?;

        if parsed.playability_status.status != "OK" {
            return Err(ExtractorError::RemoteRejection {
                status: parsed.playability_status.status.clone(),
                reason: parsed
                    .playability_status
                    .reason
                    .unwrap_or_else(|| "unspecified".into()),
            });
        }

        let streaming_data = parsed
            .streaming_data
            .ok_or(ExtractorError::NoPlayableFormat)?;
        let format = player_api::select_best_format(&streaming_data.adaptive_formats)
            .ok_or(ExtractorError::NoPlayableFormat)?
            .clone();

        let resolved_url = if format.needs_deobfuscation() {
            self.deobfuscate_format(&format).await?
        } else {
            format.url.clone().ok_or(ExtractorError::NoPlayableFormat)?
        };

        let cpn = cpn::generate_cpn();
        let resolved_url = append_query_param(&resolved_url, "cpn", &cpn);

        self.validate_url(&resolved_url).await?;

        Ok(PlaybackUrlRecord::new(
            resolved_url,
            format.itag,
            format.mime_type.clone(),
            format.bitrate.unwrap_or(0),
            cpn,
        ))
    }

    #[cfg(feature = "web-strategy")]
    async fn deobfuscate_format(&self, format: &AdaptiveFormat) -> ExtractorResult<String> {
        let cipher = format
            .signature_cipher
            .as_ref()
            .ok_or_else(|| ExtractorError::DeobfuscationFailure("no signatureCipher present".into()))?;

        let player = self.ensure_js_player_loaded().await?;
        let parsed = parse_cipher_params(cipher);
        let descrambled_sig = player.deobfuscate_signature(&parsed.scrambled_signature)?;

        let mut url = parsed.url;
        url.push_str(&format!("&{}={}", parsed.signature_param, descrambled_sig));
        if let Some(n) = parsed.n_param {
            let descrambled_n = player.deobfuscate_n(&n)?;
            url.push_str(&format!("&n={descrambled_n}"));
        }
        Ok(url)
    }

    #[cfg(not(feature = "web-strategy"))]
    async fn deobfuscate_format(&self, _format: &AdaptiveFormat) -> ExtractorResult<String> {
        Err(ExtractorError::DeobfuscationFailure(
            "web-strategy feature not enabled".into(),
        ))
    }

    #[cfg(feature = "web-strategy")]
    async fn signature_timestamp(&self) -> Option<u32> {
        self.ensure_js_player_loaded()
            .await
            .ok()
            .and_then(|_| self.player_cache.lock().await.as_ref().and_then(|(_, a)| a.signature_timestamp))
    }

    #[cfg(not(feature = "web-strategy"))]
    async fn signature_timestamp(&self) -> Option<u32> {
        None
    }

    #[cfg(feature = "web-strategy")]
    async fn ensure_js_player_loaded(&self) -> ExtractorResult<CompiledPlayer> {
        {
            let cache = self.player_cache.lock().await;
            if let Some((_, artifacts)) = cache.as_ref() {
                return Ok(CompiledPlayer::new(artifacts));
            }
        }

        let embed_url = format!("{EMBED_URL_PREFIX}dQw4w9WgXcQ");
        let embed_html = self
            .http
            .get(&embed_url)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| ExtractorError::TransientNetwork(e.to_string()))?
            .text()
            .await
            .map_err(|e| ExtractorError::TransientNetwork(e.to_string()))?;

        let base_js_url = find_base_js_url(&embed_html)?;
        let player_js = self
            .http
            .get(&base_js_url)
            .send()
            .await
            .map_err(|e| ExtractorError::TransientNetwork(e.to_string()))?
            .text()
            .await
            .map_err(|e| ExtractorError::TransientNetwork(e.to_string()))?;

        let artifacts = extract_artifacts(&player_js)?;
        let compiled = CompiledPlayer::new(&artifacts);
        *self.player_cache.lock().await = Some((base_js_url, artifacts));
        Ok(compiled)
    }

    /// HEAD-validate a candidate URL. 403/410 are treated as a strategy
    /// failure (`StreamGone`); other network errors are non-fatal.
    async fn validate_url(&self, url: &str) -> ExtractorResult<()> {
        let response = self
            .http
            .head(url)
            .timeout(Duration::from_secs(self.config.head_validation_timeout_secs))
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status().as_u16();
                if status == 403 || status == 410 {
                    Err(ExtractorError::StreamGone { status })
                } else {
                    Ok(())
                }
            }
            Err(_) => Ok(()), // non-fatal: other network errors during HEAD
        }
    }

    /// Drop the JS player artifact cache, forcing a fresh scrape on next
    /// resolve. Called after repeated `DeobfuscationFailure`s.
    #[cfg(feature = "web-strategy")]
    pub async fn invalidate_player_cache(&self) {
        *self.player_cache.lock().await = None;
    }

    #[cfg(not(feature = "web-strategy"))]
    pub async fn invalidate_player_cache(&self) {}

    pub async fn invalidate(&self, video_id: &str) {
        self.cache.invalidate(video_id).await;
    }
}

#[cfg(feature = "web-strategy")]
struct CipherParams {
    url: String,
    scrambled_signature: String,
    signature_param: String,
    n_param: Option<String>,
}

#[cfg(feature = "web-strategy")]
fn parse_cipher_params(cipher: &str) -> CipherParams {
    let mut url = String::new();
    let mut scrambled_signature = String::new();
    let mut signature_param = "sig".to_string();
    for pair in cipher.split('&') {
        let mut kv = pair.splitn(2, '=');
        let key = kv.next().unwrap_or_default();
        let value = kv.next().unwrap_or_default();
        let decoded = urlencoding_decode(value);
        match key {
            "url" => url = decoded,
            "s" => scrambled_signature = decoded,
            "sp" => signature_param = decoded,
            _ => {}
        }
    }
    let n_param = url
        .split('?')
        .nth(1)
        .and_then(|q| q.split('&').find(|p| p.starts_with("n=")))
        .map(|p| p.trim_start_matches("n=").to_string());

    CipherParams {
        url,
        scrambled_signature,
        signature_param,
        n_param,
    }
}

/// Append a `key=value` query parameter to a URL, using `?` if it has no
/// query string yet and `&` otherwise.
fn append_query_param(url: &str, key: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{key}={value}")
}

/// Minimal percent-decoding sufficient for cipher query parameters; this
/// crate has no general-purpose URL parsing dependency.
#[cfg(feature = "web-strategy")]
fn urlencoding_decode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    out.push(byte as char);
                }
            }
            '+' => out.push(' '),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extractor_config_default_enables_web_strategy() {
        let config = ExtractorConfig::default();
        assert!(config.enable_web_strategy);
    }

    #[test]
    fn append_query_param_uses_question_mark_when_url_has_no_query() {
        let url = append_query_param("https://example.com/videoplayback", "cpn", "abc123");
        assert_eq!(url, "https://example.com/videoplayback?cpn=abc123");
    }

    #[test]
    fn append_query_param_uses_ampersand_when_url_already_has_a_query() {
        let url = append_query_param("https://example.com/videoplayback?itag=140", "cpn", "abc123");
        assert_eq!(url, "https://example.com/videoplayback?itag=140&cpn=abc123");
    }

    #[cfg(feature = "web-strategy")]
    #[test]
    fn cipher_params_parsed_from_query_string() {
        let cipher = "s=abc%20def&sp=signature&url=https%3A%2F%2Fexample.com%2Fvideoplayback%3Fn%3Dxyz";
        let parsed = parse_cipher_params(cipher);
        assert_eq!(parsed.scrambled_signature, "abc def");
        assert_eq!(parsed.signature_param, "signature");
        assert_eq!(parsed.n_param.as_deref(), Some("xyz"));
        assert!(parsed.url.starts_with("https://example.com"));
    }
}

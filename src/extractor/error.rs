//! Error kinds surfaced by the Stream Extractor (SPEC_FULL.md §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    /// Retryable via backoff within a single resolve; swallowed inside
    /// fire-and-forget pings.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// HTTP 4xx on the player API with `playabilityStatus != OK`.
    #[error("remote rejected playback ({status}): {reason}")]
    RemoteRejection { status: String, reason: String },

    /// 403/410 on the HEAD validation request. Must not be cached.
    #[error("stream gone (HEAD returned {status})")]
    StreamGone { status: u16 },

    /// The embedded JS interpreter couldn't locate or evaluate the
    /// signature/n-parameter descrambling functions.
    #[error("deobfuscation failed: {0}")]
    DeobfuscationFailure(String),

    /// Every strategy in the chain failed; fatal for this resolve call.
    #[error("all strategies failed: {0:?}")]
    AllStrategiesFailed(Vec<String>),

    /// No audio-only adaptive format survived the filter in SPEC_FULL.md §6.
    #[error("no playable audio format found")]
    NoPlayableFormat,
}

pub type ExtractorResult<T> = Result<T, ExtractorError>;

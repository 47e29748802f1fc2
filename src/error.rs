//! Crate-root error aggregation.
//!
//! Each subsystem defines its own `thiserror` enum (see `extractor::ExtractorError`,
//! `playback::PlaybackError`). This type wraps them for call sites that need to
//! return a single error type across a policy boundary (see SPEC_FULL.md §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Extractor(#[from] crate::extractor::ExtractorError),

    #[error(transparent)]
    Playback(#[from] crate::playback::PlaybackError),

    #[error("state violation: {0}")]
    StateViolation(String),

    #[error("buffer overflow or underrun: {0}")]
    BufferOverflowUnderflow(String),
}

pub type Result<T> = std::result::Result<T, Error>;

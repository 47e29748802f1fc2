use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("decoder failed to open: {0}")]
    OpenFailed(String),
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("no track loaded")]
    NoTrackLoaded,
    #[error("seek out of range: requested {requested}s, duration {duration}s")]
    SeekOutOfRange { requested: f64, duration: f64 },
}

pub type PlaybackResult<T> = std::result::Result<T, PlaybackError>;

//! Typed failures for the playback pipeline.
//!
//! Decode and device problems cross thread boundaries as values, never as
//! panics; the output callback in particular converts any fault into
//! silence plus a reported error. Underruns are telemetry, not failures,
//! and only show up here once they are sustained enough to warrant a
//! performance warning.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Everything that can go wrong between a file path and the speakers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The container or codec is not one the decoder can handle.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The stream stopped making sense mid-decode.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// No usable output device at stream-open time. Fatal to the session.
    #[error("output device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device failed after the stream was already running.
    #[error("output device error: {0}")]
    DeviceIo(String),

    #[error("seek to {requested_ms}ms is outside the track ({duration_ms}ms)")]
    SeekOutOfRange { requested_ms: u64, duration_ms: u64 },

    /// Advisory: the callback ran dry often enough to be worth reporting.
    /// Never fatal; playback continues with silence gaps.
    #[error("sustained buffer underruns: {events} events, {frames} frames of silence")]
    BufferUnderrun { events: u64, frames: u64 },

    /// Playlist file could not be read or written.
    #[error("playlist io: {0}")]
    PlaylistIo(String),

    /// Playlist file was readable but not parseable.
    #[error("playlist parse: {0}")]
    PlaylistParse(String),
}

impl PlayerError {
    /// Errors that should skip to the next track instead of stopping the
    /// whole session. Device loss is deliberately not in this set.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            PlayerError::FileNotFound(_)
                | PlayerError::UnsupportedFormat(_)
                | PlayerError::CorruptStream(_)
        )
    }
}

impl From<std::io::Error> for PlayerError {
    fn from(err: std::io::Error) -> Self {
        PlayerError::PlaylistIo(err.to_string())
    }
}

/// Classify a Symphonia failure from the probe/decode path into the
/// player taxonomy. Seek failures are mapped at the seek call site where
/// the requested position is known.
pub(crate) fn classify_symphonia(err: symphonia::core::errors::Error) -> PlayerError {
    use symphonia::core::errors::Error;
    match err {
        Error::Unsupported(what) => PlayerError::UnsupportedFormat(what.to_string()),
        Error::DecodeError(what) => PlayerError::CorruptStream(what.to_string()),
        Error::IoError(io) => PlayerError::CorruptStream(io.to_string()),
        other => PlayerError::CorruptStream(other.to_string()),
    }
}

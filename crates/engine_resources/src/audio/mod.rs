//! Audio playback layer
//!
//! Backend-neutral clip types, the [`backend::AudioBackend`] seam to the
//! underlying media library, and the [`AudioPlayer`] playback session.
//! Track bookkeeping itself lives in [`crate::resource::audio`].

pub mod backend;
pub mod clip;
pub mod player;

pub use clip::{AudioClip, AudioFormat, DecodeMode, Music, Sound};
pub use player::{AudioPlayer, TrackReturnPolicy};

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by audio backends
#[derive(Error, Debug)]
pub enum AudioError {
    /// The backend (library or output device) could not be initialized
    #[error("Audio backend initialization failed: {0}")]
    BackendInitFailed(String),

    /// An operation was attempted before `initialize` or after `shutdown`
    #[error("Audio backend not initialized")]
    BackendNotInitialized,

    /// The file could not be decoded
    #[error("Failed to decode {}: {reason}", path.display())]
    DecodeFailed {
        /// File that failed
        path: PathBuf,
        /// Decoder diagnostic
        reason: String,
    },

    /// The file is not in a supported container format
    #[error("Unsupported audio format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Playback could not be started or controlled
    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    /// The voice id does not exist in this backend
    #[error("Invalid voice handle")]
    InvalidHandle,

    /// IO error while reading an audio file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

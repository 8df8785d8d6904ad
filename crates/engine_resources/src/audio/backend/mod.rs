//! Audio backend implementations
//!
//! Platform-independent abstraction over audio playback libraries. A backend
//! owns the output device and a set of voices; the resource layer above it
//! keeps all track bookkeeping and only asks the backend to make noise.

#[cfg(feature = "rodio-backend")]
pub mod rodio_backend;
pub mod null_backend;
#[cfg(test)]
pub(crate) mod mock;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audio::{AudioClip, AudioError, DecodeMode};

/// Backend-side identifier of one playback voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u32);

/// Audio backend trait for platform abstraction
///
/// # Threading
/// Not `Send + Sync`: every call happens on the main loop thread. Backends that
/// mix on a library-owned thread synchronize with it internally.
///
/// # Units
/// Fade lengths are in sample frames of the output device, see
/// [`AudioBackend::sample_rate`].
pub trait AudioBackend {
    /// Initialize the library and open the output device
    fn initialize(&mut self, config: &AudioBackendConfig) -> Result<(), AudioError>;

    /// Close the output device and shut the library down
    fn shutdown(&mut self);

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// Sample rate of the open output device
    fn sample_rate(&self) -> u32;

    /// Update the backend (cleanup finished sounds, etc.)
    fn update(&mut self);

    /// Decode (or validate, for streamed clips) an audio file
    fn decode(&mut self, path: &Path, mode: DecodeMode) -> Result<AudioClip, AudioError>;

    /// Release backend-side data for a clip that is being evicted
    fn release_clip(&mut self, _clip: &AudioClip) {}

    /// Create a new silent voice
    fn create_voice(&mut self) -> Result<VoiceId, AudioError>;

    /// Destroy a voice, stopping it first
    fn destroy_voice(&mut self, voice: VoiceId);

    /// Attach or detach a clip; halts whatever the voice was playing
    fn set_voice_clip(&mut self, voice: VoiceId, clip: Option<&AudioClip>) -> Result<(), AudioError>;

    /// Start the attached clip. `loops`: -1 infinite, N plays N+1 times
    fn play(&mut self, voice: VoiceId, loops: i32, fade_in_frames: u64) -> Result<(), AudioError>;

    /// Stop a voice, ramping to silence over `fade_out_frames` (0 = immediately)
    fn stop(&mut self, voice: VoiceId, fade_out_frames: u64) -> Result<(), AudioError>;

    /// Pause a playing voice
    fn pause(&mut self, voice: VoiceId) -> Result<(), AudioError>;

    /// Resume a paused voice
    fn resume(&mut self, voice: VoiceId) -> Result<(), AudioError>;

    /// Set voice gain (values > 1.0 will amplify)
    fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<(), AudioError>;

    /// Get voice gain
    fn gain(&self, voice: VoiceId) -> Result<f32, AudioError>;

    /// Check if a voice is audibly playing (not paused and not finished)
    fn is_playing(&self, voice: VoiceId) -> bool;

    /// Set the device-wide gain applied on top of every voice
    fn set_master_gain(&mut self, gain: f32) -> Result<(), AudioError>;

    /// Stop every voice
    fn stop_all(&mut self, fade_out_frames: u64);
}

/// Configuration for audio backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioBackendConfig {
    /// Sample rate (e.g., 44100, 48000), used when the device does not report one
    pub sample_rate: u32,
    /// Number of output channels (1=mono, 2=stereo)
    pub channels: u16,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
        }
    }
}

/// Which backend implementation to create
///
/// Defaults to `Rodio` when the `rodio-backend` feature is enabled, `Null` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioBackendKind {
    /// Platform output device through rodio
    #[cfg_attr(feature = "rodio-backend", default)]
    Rodio,
    /// Headless backend that tracks state without producing sound
    #[cfg_attr(not(feature = "rodio-backend"), default)]
    Null,
}

/// Create an (uninitialized) backend of the requested kind
///
/// # Errors
/// `BackendInitFailed` if the kind was compiled out of this build.
pub fn create_backend(kind: AudioBackendKind) -> Result<Box<dyn AudioBackend>, AudioError> {
    match kind {
        #[cfg(feature = "rodio-backend")]
        AudioBackendKind::Rodio => Ok(Box::new(rodio_backend::RodioBackend::new())),
        #[cfg(not(feature = "rodio-backend"))]
        AudioBackendKind::Rodio => Err(AudioError::BackendInitFailed(
            "built without the `rodio-backend` feature".to_string(),
        )),
        AudioBackendKind::Null => Ok(Box::new(null_backend::NullBackend::new())),
    }
}

/// Convert milliseconds to sample frames at `sample_rate`
pub const fn ms_to_frames(ms: u32, sample_rate: u32) -> u64 {
    ms as u64 * sample_rate as u64 / 1000
}

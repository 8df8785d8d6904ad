//! Headless audio backend
//!
//! Validates files and tracks voice state exactly like a real device would,
//! but never opens an output stream. Used on build machines, dedicated
//! servers and anywhere the platform has no audio hardware. Clips are never
//! decoded, so voices play until they are stopped.

use std::collections::HashMap;
use std::path::Path;

use super::{AudioBackend, AudioBackendConfig, VoiceId};
use crate::audio::{AudioClip, AudioError, AudioFormat, DecodeMode};

#[derive(Debug, Clone)]
struct NullVoice {
    has_clip: bool,
    playing: bool,
    paused: bool,
    gain: f32,
}

impl Default for NullVoice {
    fn default() -> Self {
        Self {
            has_clip: false,
            playing: false,
            paused: false,
            gain: 1.0,
        }
    }
}

/// Backend that produces no sound
pub struct NullBackend {
    config: AudioBackendConfig,
    voices: HashMap<VoiceId, NullVoice>,
    next_id: u32,
    master_gain: f32,
    initialized: bool,
}

impl NullBackend {
    /// Create a new headless backend
    pub fn new() -> Self {
        Self {
            config: AudioBackendConfig::default(),
            voices: HashMap::new(),
            next_id: 0,
            master_gain: 1.0,
            initialized: false,
        }
    }

    /// Number of live voices
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    fn voice_mut(&mut self, voice: VoiceId) -> Result<&mut NullVoice, AudioError> {
        self.voices.get_mut(&voice).ok_or(AudioError::InvalidHandle)
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for NullBackend {
    fn initialize(&mut self, config: &AudioBackendConfig) -> Result<(), AudioError> {
        if self.initialized {
            return Ok(());
        }
        self.config = config.clone();
        self.initialized = true;
        log::info!("Null audio backend initialized ({} Hz)", self.config.sample_rate);
        Ok(())
    }

    fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }
        self.voices.clear();
        self.initialized = false;
        log::info!("Null audio backend shutdown");
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn update(&mut self) {}

    fn decode(&mut self, path: &Path, _mode: DecodeMode) -> Result<AudioClip, AudioError> {
        if !self.initialized {
            return Err(AudioError::BackendNotInitialized);
        }
        let format = AudioFormat::sniff(path)?;
        Ok(AudioClip::streamed(path, format, self.config.channels, self.config.sample_rate, None))
    }

    fn create_voice(&mut self) -> Result<VoiceId, AudioError> {
        if !self.initialized {
            return Err(AudioError::BackendNotInitialized);
        }
        let id = VoiceId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.voices.insert(id, NullVoice::default());
        Ok(id)
    }

    fn destroy_voice(&mut self, voice: VoiceId) {
        self.voices.remove(&voice);
    }

    fn set_voice_clip(&mut self, voice: VoiceId, clip: Option<&AudioClip>) -> Result<(), AudioError> {
        let v = self.voice_mut(voice)?;
        v.has_clip = clip.is_some();
        v.playing = false;
        v.paused = false;
        Ok(())
    }

    fn play(&mut self, voice: VoiceId, _loops: i32, _fade_in_frames: u64) -> Result<(), AudioError> {
        let v = self.voice_mut(voice)?;
        if !v.has_clip {
            return Err(AudioError::PlaybackFailed("no clip attached".to_string()));
        }
        v.playing = true;
        v.paused = false;
        Ok(())
    }

    fn stop(&mut self, voice: VoiceId, _fade_out_frames: u64) -> Result<(), AudioError> {
        let v = self.voice_mut(voice)?;
        v.playing = false;
        v.paused = false;
        Ok(())
    }

    fn pause(&mut self, voice: VoiceId) -> Result<(), AudioError> {
        self.voice_mut(voice)?.paused = true;
        Ok(())
    }

    fn resume(&mut self, voice: VoiceId) -> Result<(), AudioError> {
        self.voice_mut(voice)?.paused = false;
        Ok(())
    }

    fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<(), AudioError> {
        self.voice_mut(voice)?.gain = gain;
        Ok(())
    }

    fn gain(&self, voice: VoiceId) -> Result<f32, AudioError> {
        self.voices.get(&voice).map(|v| v.gain).ok_or(AudioError::InvalidHandle)
    }

    fn is_playing(&self, voice: VoiceId) -> bool {
        self.voices.get(&voice).is_some_and(|v| v.playing && !v.paused)
    }

    fn set_master_gain(&mut self, gain: f32) -> Result<(), AudioError> {
        self.master_gain = gain;
        Ok(())
    }

    fn stop_all(&mut self, _fade_out_frames: u64) {
        for voice in self.voices.values_mut() {
            voice.playing = false;
            voice.paused = false;
        }
    }
}

//! Track types

use std::collections::HashSet;

use slotmap::new_key_type;

use super::device::DeviceId;
use crate::audio::backend::VoiceId;
use crate::audio::{Music, Sound};
use crate::foundation::collections::AssetHandle;

new_key_type! {
    /// Slot of a track inside its audio manager
    pub struct TrackKey;
}

/// Copyable reference to a track owned by an [`super::AudioManager`]
///
/// Carries the id of the device that issued it so handles cannot be used
/// with a different manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackHandle {
    device: DeviceId,
    key: TrackKey,
}

impl TrackHandle {
    pub(crate) const fn new(device: DeviceId, key: TrackKey) -> Self {
        Self { device, key }
    }

    /// Device that issued this handle
    pub const fn device(&self) -> DeviceId {
        self.device
    }

    /// Slot key inside the issuing manager
    pub const fn key(&self) -> TrackKey {
        self.key
    }
}

/// Playback state of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackState {
    /// No audio attached
    Idle,
    /// Audio attached, never played since binding
    Bound,
    /// Audibly playing
    Playing,
    /// Paused mid-playback
    Paused,
    /// Stopped explicitly or ran out of audio
    Stopped,
}

/// Audio that can be bound to a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioSource {
    /// A predecoded sound effect
    Sound(AssetHandle<Sound>),
    /// A streamed music file
    Music(AssetHandle<Music>),
}

impl From<AssetHandle<Sound>> for AudioSource {
    fn from(handle: AssetHandle<Sound>) -> Self {
        Self::Sound(handle)
    }
}

impl From<AssetHandle<Music>> for AudioSource {
    fn from(handle: AssetHandle<Music>) -> Self {
        Self::Music(handle)
    }
}

/// Which table currently owns a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Residency {
    /// Sitting in the free list
    Pooled,
    /// Handed out by `acquire_track`
    CheckedOut,
    /// Owned by the named-track table
    Named,
}

#[derive(Debug)]
pub(crate) struct Track {
    pub voice: VoiceId,
    pub source: Option<AudioSource>,
    pub state: TrackState,
    pub gain: f32,
    pub group: Option<String>,
    pub tags: HashSet<String>,
    pub residency: Residency,
}

impl Track {
    pub fn new(voice: VoiceId, residency: Residency) -> Self {
        Self {
            voice,
            source: None,
            state: TrackState::Idle,
            gain: 1.0,
            group: None,
            tags: HashSet::new(),
            residency,
        }
    }

    /// Back to the state a freshly created track has
    pub fn reset(&mut self) {
        self.source = None;
        self.state = TrackState::Idle;
        self.gain = 1.0;
        self.group = None;
        self.tags.clear();
    }
}

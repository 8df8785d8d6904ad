//! Audio subsystem
//!
//! [`AudioManager`] owns the mixing device, the sound and music caches, and
//! every track played through it:
//!
//! - **Pooled tracks** are created up front and checked out with
//!   [`AudioManager::acquire_track`] / [`AudioManager::release_track`].
//! - **Named tracks** are persistent channels looked up by name.
//! - **Groups** give a track at most one batch-control membership.
//! - **Tags** are free-form labels used for batch gain and stop.
//!
//! Track state machine:
//!
//! ```text
//! Idle --bind--> Bound --play--> Playing <--pause/resume--> Paused
//!                  ^                |                          |
//!                  |              stop / ran out            stop
//!                  |                v                          |
//!                  +----play---- Stopped <---------------------+
//! ```
//!
//! Binding `None` returns any state to `Idle`.

mod device;
mod pool;
mod track;

pub use device::DeviceId;
pub use pool::OverflowPolicy;
pub use track::{AudioSource, TrackHandle, TrackKey, TrackState};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use slotmap::SlotMap;

use device::MixingDevice;
use pool::TrackPool;
use track::{Residency, Track};

use super::cache::KeyedCache;
use super::{AssetKind, PoolMisuse, ResourceError};
use crate::audio::backend::AudioBackend;
use crate::audio::{AudioClip, DecodeMode, Music, Sound};
use crate::config::AudioConfig;
use crate::foundation::collections::AssetHandle;

/// Reject gains outside [0, 1] (and NaN)
fn checked_gain(gain: f32) -> Result<f32, ResourceError> {
    if (0.0..=1.0).contains(&gain) {
        Ok(gain)
    } else {
        log::warn!("Rejected gain {} (must be within [0, 1])", gain);
        Err(ResourceError::InvalidParameter(format!("gain {} outside [0, 1]", gain)))
    }
}

/// Mixing device, audio caches and track tables
pub struct AudioManager {
    sounds: KeyedCache<PathBuf, Sound>,
    music: KeyedCache<PathBuf, Music>,
    tracks: SlotMap<TrackKey, Track>,
    pool: TrackPool,
    named: HashMap<String, TrackKey>,
    groups: HashMap<String, HashSet<TrackKey>>,
    // Declared last: dropped after every track has been destroyed
    device: MixingDevice,
}

impl AudioManager {
    /// Open `backend` and allocate the track pool
    ///
    /// # Errors
    /// `DeviceInitFailure` if the backend fails to start or cannot create the
    /// pooled voices. Everything opened so far is torn down again.
    pub fn new(backend: Box<dyn AudioBackend>, config: &AudioConfig) -> Result<Self, ResourceError> {
        let device = MixingDevice::open(backend, &config.device)?;

        let mut manager = Self {
            sounds: KeyedCache::new(AssetKind::Sound),
            music: KeyedCache::new(AssetKind::Music),
            tracks: SlotMap::with_key(),
            pool: TrackPool::with_capacity(config.track_pool_size, config.overflow),
            named: HashMap::new(),
            groups: HashMap::new(),
            device,
        };

        for _ in 0..config.track_pool_size {
            let voice = manager.device.backend_mut().create_voice().map_err(|e| {
                ResourceError::DeviceInitFailure {
                    subsystem: "audio",
                    reason: format!("failed to allocate pooled track: {}", e),
                }
            })?;
            let key = manager.tracks.insert(Track::new(voice, Residency::Pooled));
            manager.pool.push(key);
        }

        log::trace!(
            "Created audio manager with {} pooled tracks ({:?} overflow)",
            config.track_pool_size,
            config.overflow
        );
        Ok(manager)
    }

    /// Identity of the mixing device, shared by every handle this manager issues
    pub const fn device_id(&self) -> DeviceId {
        self.device.id()
    }

    /// Native sample rate of the output device
    pub fn sample_rate(&self) -> u32 {
        self.device.backend().sample_rate()
    }

    /// Per-frame poll: lets the backend drop finished voices and records
    /// tracks that ran out of audio as stopped
    pub fn update(&mut self) {
        self.device.backend_mut().update();

        let backend = self.device.backend();
        for track in self.tracks.values_mut() {
            if track.state == TrackState::Playing && !backend.is_playing(track.voice) {
                track.state = TrackState::Stopped;
            }
        }
    }

    // ---------------------------------------------------------------------
    // Sound and music caches
    // ---------------------------------------------------------------------

    fn decode_sound(device: &mut MixingDevice, path: &PathBuf) -> Result<Sound, ResourceError> {
        device
            .backend_mut()
            .decode(path, DecodeMode::Predecoded)
            .map(Sound::new)
            .map_err(|e| ResourceError::LoadFailed {
                kind: AssetKind::Sound,
                path: path.clone(),
                reason: e.to_string(),
            })
    }

    fn decode_music(device: &mut MixingDevice, path: &PathBuf) -> Result<Music, ResourceError> {
        device
            .backend_mut()
            .decode(path, DecodeMode::Streamed)
            .map(Music::new)
            .map_err(|e| ResourceError::LoadFailed {
                kind: AssetKind::Music,
                path: path.clone(),
                reason: e.to_string(),
            })
    }

    /// Decode a sound effect into memory (no-op if already cached)
    pub fn load_sound(&mut self, path: impl AsRef<Path>) -> Option<AssetHandle<Sound>> {
        let device = &mut self.device;
        self.sounds.load(&path.as_ref().to_path_buf(), |p| Self::decode_sound(device, p))
    }

    /// Like [`Self::load_sound`], reporting why the load failed
    pub fn try_load_sound(&mut self, path: impl AsRef<Path>) -> Result<AssetHandle<Sound>, ResourceError> {
        let device = &mut self.device;
        self.sounds.try_load(&path.as_ref().to_path_buf(), |p| Self::decode_sound(device, p))
    }

    /// Cached sound effect, decoded on a miss
    pub fn get_sound(&mut self, path: impl AsRef<Path>) -> Option<AssetHandle<Sound>> {
        let device = &mut self.device;
        self.sounds.get(&path.as_ref().to_path_buf(), |p| Self::decode_sound(device, p))
    }

    /// Evict a sound effect, unbinding every track that plays it
    pub fn unload_sound(&mut self, path: impl AsRef<Path>) -> bool {
        let key = path.as_ref().to_path_buf();
        if let Some(handle) = self.sounds.handle(&key) {
            self.unbind_matching(|source| source == AudioSource::Sound(handle));
        }
        match self.sounds.unload(&key) {
            Some(sound) => {
                self.device.backend_mut().release_clip(sound.clip());
                true
            }
            None => false,
        }
    }

    /// Evict every sound effect, returning the number released
    pub fn clear_sounds(&mut self) -> usize {
        self.unbind_matching(|source| matches!(source, AudioSource::Sound(_)));
        let drained = self.sounds.drain();
        for (_, sound) in &drained {
            self.device.backend_mut().release_clip(sound.clip());
        }
        if !drained.is_empty() {
            log::debug!("Cleared {} sounds", drained.len());
        }
        drained.len()
    }

    /// Sound effect behind a handle
    pub fn sound(&self, handle: AssetHandle<Sound>) -> Option<&Sound> {
        self.sounds.resolve(handle)
    }

    /// Validate a music file for streaming (no-op if already cached)
    pub fn load_music(&mut self, path: impl AsRef<Path>) -> Option<AssetHandle<Music>> {
        let device = &mut self.device;
        self.music.load(&path.as_ref().to_path_buf(), |p| Self::decode_music(device, p))
    }

    /// Like [`Self::load_music`], reporting why the load failed
    pub fn try_load_music(&mut self, path: impl AsRef<Path>) -> Result<AssetHandle<Music>, ResourceError> {
        let device = &mut self.device;
        self.music.try_load(&path.as_ref().to_path_buf(), |p| Self::decode_music(device, p))
    }

    /// Cached music, loaded on a miss
    pub fn get_music(&mut self, path: impl AsRef<Path>) -> Option<AssetHandle<Music>> {
        let device = &mut self.device;
        self.music.get(&path.as_ref().to_path_buf(), |p| Self::decode_music(device, p))
    }

    /// Evict a music file, unbinding every track that plays it
    pub fn unload_music(&mut self, path: impl AsRef<Path>) -> bool {
        let key = path.as_ref().to_path_buf();
        if let Some(handle) = self.music.handle(&key) {
            self.unbind_matching(|source| source == AudioSource::Music(handle));
        }
        match self.music.unload(&key) {
            Some(music) => {
                self.device.backend_mut().release_clip(music.clip());
                true
            }
            None => false,
        }
    }

    /// Evict every music file, returning the number released
    pub fn clear_music(&mut self) -> usize {
        self.unbind_matching(|source| matches!(source, AudioSource::Music(_)));
        let drained = self.music.drain();
        for (_, music) in &drained {
            self.device.backend_mut().release_clip(music.clip());
        }
        if !drained.is_empty() {
            log::debug!("Cleared {} music files", drained.len());
        }
        drained.len()
    }

    /// Music behind a handle
    pub fn music(&self, handle: AssetHandle<Music>) -> Option<&Music> {
        self.music.resolve(handle)
    }

    /// Evict every sound and music file
    pub fn clear_audio(&mut self) -> usize {
        self.clear_sounds() + self.clear_music()
    }

    /// Number of cached sound effects
    pub fn sound_count(&self) -> usize {
        self.sounds.len()
    }

    /// Number of cached music files
    pub fn music_count(&self) -> usize {
        self.music.len()
    }

    fn clip_of<'a>(
        sounds: &'a KeyedCache<PathBuf, Sound>,
        music: &'a KeyedCache<PathBuf, Music>,
        source: AudioSource,
    ) -> Result<&'a AudioClip, ResourceError> {
        match source {
            AudioSource::Sound(handle) => sounds
                .resolve(handle)
                .map(Sound::clip)
                .ok_or(ResourceError::StaleAsset(AssetKind::Sound)),
            AudioSource::Music(handle) => music
                .resolve(handle)
                .map(Music::clip)
                .ok_or(ResourceError::StaleAsset(AssetKind::Music)),
        }
    }

    /// Stop and detach every track whose source matches
    fn unbind_matching(&mut self, matches: impl Fn(AudioSource) -> bool) {
        let backend = self.device.backend_mut();
        for track in self.tracks.values_mut() {
            if !track.source.is_some_and(&matches) {
                continue;
            }
            if let Err(e) = backend.stop(track.voice, 0).and_then(|()| backend.set_voice_clip(track.voice, None)) {
                log::warn!("Failed to unbind voice {:?}: {}", track.voice, e);
            }
            track.source = None;
            track.state = TrackState::Idle;
        }
    }

    // ---------------------------------------------------------------------
    // Track pool
    // ---------------------------------------------------------------------

    fn handle(&self, key: TrackKey) -> TrackHandle {
        TrackHandle::new(self.device.id(), key)
    }

    /// Check a handle belongs to this manager and is still alive
    fn validate(&self, track: TrackHandle) -> Result<TrackKey, ResourceError> {
        if track.device() != self.device.id() {
            return Err(ResourceError::PoolMisuse(PoolMisuse::ForeignDevice));
        }
        if !self.tracks.contains_key(track.key()) {
            return Err(ResourceError::PoolMisuse(PoolMisuse::StaleTrack));
        }
        Ok(track.key())
    }

    fn entry(&self, key: TrackKey) -> Result<&Track, ResourceError> {
        self.tracks.get(key).ok_or(ResourceError::PoolMisuse(PoolMisuse::StaleTrack))
    }

    fn entry_mut(&mut self, key: TrackKey) -> Result<&mut Track, ResourceError> {
        self.tracks.get_mut(key).ok_or(ResourceError::PoolMisuse(PoolMisuse::StaleTrack))
    }

    fn create_track(&mut self, residency: Residency) -> Result<TrackKey, ResourceError> {
        let voice = self.device.backend_mut().create_voice()?;
        Ok(self.tracks.insert(Track::new(voice, residency)))
    }

    /// Check out an idle pooled track
    ///
    /// # Errors
    /// `PoolExhausted` when the pool is empty under [`OverflowPolicy::Bounded`].
    pub fn acquire_track(&mut self) -> Result<TrackHandle, ResourceError> {
        if let Some(key) = self.pool.pop() {
            self.entry_mut(key)?.residency = Residency::CheckedOut;
            return Ok(self.handle(key));
        }

        let capacity = self.pool.capacity();
        match self.pool.policy() {
            OverflowPolicy::Elastic => {
                log::warn!("Track pool exhausted (capacity {}), creating an overflow track", capacity);
                let key = self.create_track(Residency::CheckedOut)?;
                self.pool.grow();
                Ok(self.handle(key))
            }
            OverflowPolicy::Bounded => {
                log::warn!("Track pool exhausted (capacity {})", capacity);
                Err(ResourceError::PoolExhausted { capacity })
            }
        }
    }

    /// Return a checked-out track to the pool
    ///
    /// The track is stopped, unbound, reset to gain 1.0 and removed from its
    /// group and tags.
    ///
    /// # Errors
    /// `PoolMisuse` for a track that is already pooled, named, stale or from
    /// another device. Nothing changes in that case.
    pub fn release_track(&mut self, track: TrackHandle) -> Result<(), ResourceError> {
        let key = self.validate(track).and_then(|key| match self.entry(key)?.residency {
            Residency::CheckedOut => Ok(key),
            Residency::Pooled => Err(ResourceError::PoolMisuse(PoolMisuse::DoubleRelease)),
            Residency::Named => Err(ResourceError::PoolMisuse(PoolMisuse::NamedTrack)),
        });
        let key = match key {
            Ok(key) => key,
            Err(e) => {
                log::warn!("Invalid track release: {}", e);
                return Err(e);
            }
        };

        self.leave_group(key);
        let backend = self.device.backend_mut();
        let entry = self.tracks.get_mut(key).ok_or(ResourceError::PoolMisuse(PoolMisuse::StaleTrack))?;
        let voice = entry.voice;
        let reset = backend
            .stop(voice, 0)
            .and_then(|()| backend.set_voice_clip(voice, None))
            .and_then(|()| backend.set_gain(voice, 1.0));
        if let Err(e) = reset {
            log::warn!("Failed to reset voice {:?} on release: {}", voice, e);
        }
        entry.reset();
        entry.residency = Residency::Pooled;
        self.pool.push(key);
        Ok(())
    }

    /// Idle tracks left in the pool
    pub fn pool_available(&self) -> usize {
        self.pool.available()
    }

    /// Pooled tracks owned by the manager, including overflow tracks
    pub const fn pool_capacity(&self) -> usize {
        self.pool.capacity()
    }

    // ---------------------------------------------------------------------
    // Named tracks
    // ---------------------------------------------------------------------

    /// Persistent track for `name`, created on first use
    pub fn named_track(&mut self, name: &str) -> Result<TrackHandle, ResourceError> {
        if let Some(&key) = self.named.get(name) {
            return Ok(self.handle(key));
        }
        let key = self.create_track(Residency::Named)?;
        self.named.insert(name.to_string(), key);
        log::debug!("Created named track {:?}", name);
        Ok(self.handle(key))
    }

    /// Whether a named track exists
    pub fn has_named_track(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// Destroy a named track; its handle goes stale
    pub fn unload_named_track(&mut self, name: &str) -> bool {
        let Some(key) = self.named.remove(name) else {
            log::warn!("Cannot unload named track {:?}: not created", name);
            return false;
        };
        self.destroy_track(key);
        log::debug!("Unloaded named track {:?}", name);
        true
    }

    /// Destroy every named track, returning the number destroyed
    pub fn clear_named_tracks(&mut self) -> usize {
        let keys: Vec<TrackKey> = self.named.drain().map(|(_, key)| key).collect();
        for &key in &keys {
            self.destroy_track(key);
        }
        keys.len()
    }

    fn destroy_track(&mut self, key: TrackKey) {
        self.leave_group(key);
        let Some(track) = self.tracks.remove(key) else {
            return;
        };
        let backend = self.device.backend_mut();
        if track.source.is_some() {
            if let Err(e) = backend.stop(track.voice, 0).and_then(|()| backend.set_voice_clip(track.voice, None)) {
                log::warn!("Failed to unbind voice {:?}: {}", track.voice, e);
            }
        }
        backend.destroy_voice(track.voice);
    }

    // ---------------------------------------------------------------------
    // Playback control
    // ---------------------------------------------------------------------

    /// State of a track as last observed; a playing track whose clip ran out
    /// reports `Stopped`
    fn observed_state(&self, key: TrackKey) -> TrackState {
        self.tracks.get(key).map_or(TrackState::Idle, |track| {
            if track.state == TrackState::Playing && !self.device.backend().is_playing(track.voice) {
                TrackState::Stopped
            } else {
                track.state
            }
        })
    }

    /// Attach audio to a track (or detach with `None`), halting playback
    ///
    /// # Errors
    /// `StaleAsset` if the source has been evicted from its cache.
    pub fn bind(&mut self, track: TrackHandle, source: Option<AudioSource>) -> Result<(), ResourceError> {
        let key = self.validate(track)?;
        let clip = source
            .map(|source| Self::clip_of(&self.sounds, &self.music, source))
            .transpose()?;

        let entry = self.tracks.get_mut(key).ok_or(ResourceError::PoolMisuse(PoolMisuse::StaleTrack))?;
        self.device.backend_mut().set_voice_clip(entry.voice, clip)?;
        entry.source = source;
        entry.state = if source.is_some() { TrackState::Bound } else { TrackState::Idle };
        Ok(())
    }

    /// Start playback of the bound audio
    ///
    /// `loops`: -1 loops forever, 0 plays once, N plays N + 1 times.
    ///
    /// # Errors
    /// - `InvalidParameter` if `loops` < -1
    /// - `InvalidTrackState` unless the track is bound or stopped
    pub fn play(&mut self, track: TrackHandle, loops: i32, fade_in_ms: u32) -> Result<(), ResourceError> {
        let key = self.validate(track)?;
        if loops < -1 {
            return Err(ResourceError::InvalidParameter(format!("loop count {} below -1", loops)));
        }
        let state = self.observed_state(key);
        if !matches!(state, TrackState::Bound | TrackState::Stopped) {
            return Err(ResourceError::InvalidTrackState(format!("cannot play a track that is {:?}", state)));
        }

        let frames = self.device.frames(fade_in_ms);
        let voice = self.entry(key)?.voice;
        self.device.backend_mut().play(voice, loops, frames)?;
        self.entry_mut(key)?.state = TrackState::Playing;
        Ok(())
    }

    fn stop_key(&mut self, key: TrackKey, fade_out_ms: u32) -> Result<(), ResourceError> {
        if !matches!(self.observed_state(key), TrackState::Playing | TrackState::Paused) {
            return Ok(());
        }
        let frames = self.device.frames(fade_out_ms);
        let voice = self.entry(key)?.voice;
        self.device.backend_mut().stop(voice, frames)?;
        self.entry_mut(key)?.state = TrackState::Stopped;
        Ok(())
    }

    fn pause_key(&mut self, key: TrackKey) -> Result<(), ResourceError> {
        if self.observed_state(key) != TrackState::Playing {
            return Ok(());
        }
        let voice = self.entry(key)?.voice;
        self.device.backend_mut().pause(voice)?;
        self.entry_mut(key)?.state = TrackState::Paused;
        Ok(())
    }

    fn resume_key(&mut self, key: TrackKey) -> Result<(), ResourceError> {
        if self.observed_state(key) != TrackState::Paused {
            return Ok(());
        }
        let voice = self.entry(key)?.voice;
        self.device.backend_mut().resume(voice)?;
        self.entry_mut(key)?.state = TrackState::Playing;
        Ok(())
    }

    fn gain_key(&mut self, key: TrackKey, gain: f32) -> Result<(), ResourceError> {
        let voice = self.entry(key)?.voice;
        self.device.backend_mut().set_gain(voice, gain)?;
        self.entry_mut(key)?.gain = gain;
        Ok(())
    }

    /// Stop a playing or paused track, fading out over `fade_out_ms`
    pub fn stop(&mut self, track: TrackHandle, fade_out_ms: u32) -> Result<(), ResourceError> {
        let key = self.validate(track)?;
        self.stop_key(key, fade_out_ms)
    }

    /// Pause a playing track
    pub fn pause(&mut self, track: TrackHandle) -> Result<(), ResourceError> {
        let key = self.validate(track)?;
        self.pause_key(key)
    }

    /// Resume a paused track
    pub fn resume(&mut self, track: TrackHandle) -> Result<(), ResourceError> {
        let key = self.validate(track)?;
        self.resume_key(key)
    }

    /// Set a track's gain, audible immediately
    ///
    /// # Errors
    /// `InvalidParameter` for gains outside [0, 1] or NaN.
    pub fn set_track_gain(&mut self, track: TrackHandle, gain: f32) -> Result<(), ResourceError> {
        let key = self.validate(track)?;
        let gain = checked_gain(gain)?;
        self.gain_key(key, gain)
    }

    /// Current gain of a track
    pub fn track_gain(&self, track: TrackHandle) -> Result<f32, ResourceError> {
        let key = self.validate(track)?;
        Ok(self.entry(key)?.gain)
    }

    /// Current state of a track
    pub fn track_state(&self, track: TrackHandle) -> Result<TrackState, ResourceError> {
        let key = self.validate(track)?;
        Ok(self.observed_state(key))
    }

    /// Whether a track is audibly playing
    pub fn is_track_playing(&self, track: TrackHandle) -> bool {
        self.validate(track)
            .is_ok_and(|key| self.observed_state(key) == TrackState::Playing)
    }

    /// Audio currently bound to a track
    pub fn track_source(&self, track: TrackHandle) -> Option<AudioSource> {
        let key = self.validate(track).ok()?;
        self.tracks.get(key)?.source
    }

    /// Stop every track
    pub fn stop_all(&mut self, fade_out_ms: u32) {
        let frames = self.device.frames(fade_out_ms);
        self.device.backend_mut().stop_all(frames);
        for track in self.tracks.values_mut() {
            if matches!(track.state, TrackState::Playing | TrackState::Paused) {
                track.state = TrackState::Stopped;
            }
        }
    }

    /// Set the device-wide gain applied on top of every track
    ///
    /// # Errors
    /// `InvalidParameter` for gains outside [0, 1] or NaN.
    pub fn set_master_gain(&mut self, gain: f32) -> Result<(), ResourceError> {
        let gain = checked_gain(gain)?;
        self.device.set_master_gain(gain)?;
        log::info!("Master gain set to {:.2}", gain);
        Ok(())
    }

    /// Device-wide gain
    pub const fn master_gain(&self) -> f32 {
        self.device.master_gain()
    }

    // ---------------------------------------------------------------------
    // Groups
    // ---------------------------------------------------------------------

    fn leave_group(&mut self, key: TrackKey) {
        let Some(name) = self.tracks.get_mut(key).and_then(|t| t.group.take()) else {
            return;
        };
        if let Some(members) = self.groups.get_mut(&name) {
            members.remove(&key);
        }
    }

    fn member_keys(&self, name: &str) -> Vec<TrackKey> {
        self.groups
            .get(name)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Create a group if it does not exist yet
    pub fn create_group(&mut self, name: &str) {
        if !self.groups.contains_key(name) {
            self.groups.insert(name.to_string(), HashSet::new());
            log::debug!("Created track group {:?}", name);
        }
    }

    /// Move a track into `name`, leaving any previous group
    ///
    /// The group is created if needed.
    pub fn add_to_group(&mut self, track: TrackHandle, name: &str) -> Result<(), ResourceError> {
        let key = self.validate(track)?;
        self.leave_group(key);
        self.create_group(name);
        if let Some(members) = self.groups.get_mut(name) {
            members.insert(key);
        }
        self.entry_mut(key)?.group = Some(name.to_string());
        Ok(())
    }

    /// Remove a track from its group; `false` if it had none
    pub fn remove_from_group(&mut self, track: TrackHandle) -> Result<bool, ResourceError> {
        let key = self.validate(track)?;
        let had_group = self.entry(key)?.group.is_some();
        self.leave_group(key);
        Ok(had_group)
    }

    /// Group a track belongs to
    pub fn track_group(&self, track: TrackHandle) -> Option<&str> {
        let key = self.validate(track).ok()?;
        self.tracks.get(key)?.group.as_deref()
    }

    /// Tracks currently in `name`
    pub fn group_members(&self, name: &str) -> Vec<TrackHandle> {
        self.member_keys(name).into_iter().map(|key| self.handle(key)).collect()
    }

    /// Drop a group, clearing its members' membership
    pub fn unload_group(&mut self, name: &str) -> bool {
        let Some(members) = self.groups.remove(name) else {
            log::warn!("Cannot unload track group {:?}: not created", name);
            return false;
        };
        for key in members {
            if let Some(track) = self.tracks.get_mut(key) {
                track.group = None;
            }
        }
        true
    }

    /// Drop every group, returning the number dropped
    pub fn clear_groups(&mut self) -> usize {
        for track in self.tracks.values_mut() {
            track.group = None;
        }
        let count = self.groups.len();
        self.groups.clear();
        count
    }

    /// Set the gain of every track in a group
    pub fn set_group_gain(&mut self, name: &str, gain: f32) -> Result<(), ResourceError> {
        let gain = checked_gain(gain)?;
        for key in self.member_keys(name) {
            if let Err(e) = self.gain_key(key, gain) {
                log::warn!("Failed to set gain in group {:?}: {}", name, e);
            }
        }
        Ok(())
    }

    /// Stop every track in a group
    pub fn stop_group(&mut self, name: &str, fade_out_ms: u32) {
        for key in self.member_keys(name) {
            if let Err(e) = self.stop_key(key, fade_out_ms) {
                log::warn!("Failed to stop track in group {:?}: {}", name, e);
            }
        }
    }

    /// Pause every playing track in a group
    pub fn pause_group(&mut self, name: &str) {
        for key in self.member_keys(name) {
            if let Err(e) = self.pause_key(key) {
                log::warn!("Failed to pause track in group {:?}: {}", name, e);
            }
        }
    }

    /// Resume every paused track in a group
    pub fn resume_group(&mut self, name: &str) {
        for key in self.member_keys(name) {
            if let Err(e) = self.resume_key(key) {
                log::warn!("Failed to resume track in group {:?}: {}", name, e);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Tags
    // ---------------------------------------------------------------------

    fn tagged_keys(&self, tag: &str) -> Vec<TrackKey> {
        self.tracks
            .iter()
            .filter(|(_, track)| track.tags.contains(tag))
            .map(|(key, _)| key)
            .collect()
    }

    /// Add a tag to a track (idempotent)
    pub fn tag_track(&mut self, track: TrackHandle, tag: &str) -> Result<(), ResourceError> {
        let key = self.validate(track)?;
        self.entry_mut(key)?.tags.insert(tag.to_string());
        Ok(())
    }

    /// Remove a tag from a track; absent tags are ignored
    pub fn untag_track(&mut self, track: TrackHandle, tag: &str) -> Result<(), ResourceError> {
        let key = self.validate(track)?;
        self.entry_mut(key)?.tags.remove(tag);
        Ok(())
    }

    /// Whether a track carries `tag`
    pub fn track_has_tag(&self, track: TrackHandle, tag: &str) -> bool {
        self.validate(track)
            .ok()
            .and_then(|key| self.tracks.get(key))
            .is_some_and(|t| t.tags.contains(tag))
    }

    /// Tracks carrying `tag`
    pub fn tracks_with_tag(&self, tag: &str) -> Vec<TrackHandle> {
        self.tagged_keys(tag).into_iter().map(|key| self.handle(key)).collect()
    }

    /// Set the gain of every track carrying `tag`, returning how many were changed
    pub fn set_tag_gain(&mut self, tag: &str, gain: f32) -> Result<usize, ResourceError> {
        let gain = checked_gain(gain)?;
        let mut changed = 0;
        for key in self.tagged_keys(tag) {
            match self.gain_key(key, gain) {
                Ok(()) => changed += 1,
                Err(e) => log::warn!("Failed to set gain for tag {:?}: {}", tag, e),
            }
        }
        Ok(changed)
    }

    /// Stop every track carrying `tag`
    pub fn stop_tag(&mut self, tag: &str, fade_out_ms: u32) {
        for key in self.tagged_keys(tag) {
            if let Err(e) = self.stop_key(key, fade_out_ms) {
                log::warn!("Failed to stop track tagged {:?}: {}", tag, e);
            }
        }
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        log::trace!("Destroying audio manager ({} tracks)", self.tracks.len());

        self.device.backend_mut().stop_all(0);
        self.clear_audio();

        self.named.clear();
        self.pool.drain();
        let keys: Vec<TrackKey> = self.tracks.keys().collect();
        for key in keys {
            self.destroy_track(key);
        }

        self.groups.clear();
        // `device` drops next and shuts the backend down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::mock::{MockBackend, MockCall, MockLog};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn manager_with(config: AudioConfig) -> (AudioManager, Rc<RefCell<MockLog>>) {
        let (backend, log) = MockBackend::new();
        (AudioManager::new(Box::new(backend), &config).unwrap(), log)
    }

    fn manager(pool: usize) -> (AudioManager, Rc<RefCell<MockLog>>) {
        manager_with(AudioConfig {
            track_pool_size: pool,
            ..AudioConfig::default()
        })
    }

    fn bound_track(audio: &mut AudioManager) -> TrackHandle {
        let sound = audio.load_sound("laser.wav").unwrap();
        let track = audio.acquire_track().unwrap();
        audio.bind(track, Some(sound.into())).unwrap();
        track
    }

    #[test]
    fn test_init_failure_is_reported() {
        let (backend, _log) = MockBackend::failing();
        let result = AudioManager::new(Box::new(backend), &AudioConfig::default());
        assert!(matches!(
            result,
            Err(ResourceError::DeviceInitFailure { subsystem: "audio", .. })
        ));
    }

    #[test]
    fn test_partial_pool_allocation_is_torn_down() {
        let (backend, log) = MockBackend::new();
        log.borrow_mut().fail_voice_after = Some(2);
        let config = AudioConfig {
            track_pool_size: 4,
            ..AudioConfig::default()
        };

        let result = AudioManager::new(Box::new(backend), &config);
        assert!(matches!(
            result,
            Err(ResourceError::DeviceInitFailure { subsystem: "audio", .. })
        ));

        let log = log.borrow();
        assert_eq!(log.count(|c| matches!(c, MockCall::CreateVoice(_))), 2);
        assert_eq!(log.count(|c| matches!(c, MockCall::DestroyVoice(_))), 2);
        assert_eq!(log.calls.last(), Some(&MockCall::Shutdown));
        assert!(log.voices.is_empty());
    }

    #[test]
    fn test_pool_restores_after_release() {
        let (mut audio, _log) = manager(4);
        let tracks: Vec<_> = (0..4).map(|_| audio.acquire_track().unwrap()).collect();
        assert_eq!(audio.pool_available(), 0);

        for track in tracks {
            audio.release_track(track).unwrap();
        }
        assert_eq!(audio.pool_available(), 4);
        assert_eq!(audio.pool_capacity(), 4);
    }

    #[test]
    fn test_elastic_overflow_grows_pool() {
        let (mut audio, _log) = manager(2);
        let tracks: Vec<_> = (0..3).map(|_| audio.acquire_track().unwrap()).collect();
        assert_eq!(audio.pool_capacity(), 3);

        let overflow = tracks[2];
        let beep = audio.load_sound("beep.wav").unwrap();
        audio.bind(overflow, Some(beep.into())).unwrap();
        audio.play(overflow, 0, 0).unwrap();
        assert!(audio.is_track_playing(overflow));

        for track in tracks {
            audio.release_track(track).unwrap();
        }
        assert_eq!(audio.pool_available(), 3);
    }

    #[test]
    fn test_bounded_overflow_fails() {
        let (mut audio, _log) = manager_with(AudioConfig {
            track_pool_size: 1,
            overflow: OverflowPolicy::Bounded,
            ..AudioConfig::default()
        });
        audio.acquire_track().unwrap();
        assert!(matches!(
            audio.acquire_track(),
            Err(ResourceError::PoolExhausted { capacity: 1 })
        ));
    }

    #[test]
    fn test_double_release_rejected() {
        let (mut audio, _log) = manager(2);
        let track = audio.acquire_track().unwrap();
        audio.release_track(track).unwrap();
        let available = audio.pool_available();

        assert!(matches!(
            audio.release_track(track),
            Err(ResourceError::PoolMisuse(PoolMisuse::DoubleRelease))
        ));
        assert_eq!(audio.pool_available(), available);
    }

    #[test]
    fn test_cross_device_release_rejected() {
        let (mut first, _) = manager(1);
        let (mut second, _) = manager(1);
        let track = first.acquire_track().unwrap();

        assert!(matches!(
            second.release_track(track),
            Err(ResourceError::PoolMisuse(PoolMisuse::ForeignDevice))
        ));
        assert_eq!(second.pool_available(), 1);
        assert!(matches!(
            second.play(track, 0, 0),
            Err(ResourceError::PoolMisuse(PoolMisuse::ForeignDevice))
        ));
    }

    #[test]
    fn test_named_track_is_persistent() {
        let (mut audio, _log) = manager(1);
        let music = audio.named_track("music").unwrap();
        assert_eq!(audio.named_track("music").unwrap(), music);

        assert!(matches!(
            audio.release_track(music),
            Err(ResourceError::PoolMisuse(PoolMisuse::NamedTrack))
        ));
        assert_eq!(audio.pool_available(), 1);

        assert!(audio.unload_named_track("music"));
        assert!(!audio.has_named_track("music"));
        assert!(matches!(
            audio.track_state(music),
            Err(ResourceError::PoolMisuse(PoolMisuse::StaleTrack))
        ));
        assert!(!audio.unload_named_track("music"));
    }

    #[test]
    fn test_play_state_machine() {
        let (mut audio, log) = manager(1);
        let track = audio.acquire_track().unwrap();
        assert_eq!(audio.track_state(track).unwrap(), TrackState::Idle);
        assert!(matches!(audio.play(track, 0, 0), Err(ResourceError::InvalidTrackState(_))));

        let sound = audio.load_sound("laser.wav").unwrap();
        audio.bind(track, Some(AudioSource::Sound(sound))).unwrap();
        assert_eq!(audio.track_state(track).unwrap(), TrackState::Bound);

        audio.play(track, 0, 0).unwrap();
        assert_eq!(audio.track_state(track).unwrap(), TrackState::Playing);
        assert!(matches!(audio.play(track, 0, 0), Err(ResourceError::InvalidTrackState(_))));

        audio.pause(track).unwrap();
        assert_eq!(audio.track_state(track).unwrap(), TrackState::Paused);
        assert!(matches!(audio.play(track, 0, 0), Err(ResourceError::InvalidTrackState(_))));
        audio.resume(track).unwrap();

        let voice = audio.tracks[track.key()].voice;
        log.borrow_mut().finish(voice);
        assert_eq!(audio.track_state(track).unwrap(), TrackState::Stopped);
        audio.play(track, 2, 0).unwrap();
        assert_eq!(audio.track_state(track).unwrap(), TrackState::Playing);

        audio.bind(track, None).unwrap();
        assert_eq!(audio.track_state(track).unwrap(), TrackState::Idle);
    }

    #[test]
    fn test_pause_resume_guarded_by_state() {
        let (mut audio, log) = manager(1);
        let track = bound_track(&mut audio);

        audio.pause(track).unwrap();
        audio.resume(track).unwrap();
        audio.stop(track, 0).unwrap();
        let log = log.borrow();
        assert_eq!(log.count(|c| matches!(c, MockCall::Pause(_) | MockCall::Resume(_))), 0);
        assert_eq!(log.count(|c| matches!(c, MockCall::Stop { fade_out_frames: 0, .. })), 0);
    }

    #[test]
    fn test_loop_count_validated() {
        let (mut audio, _log) = manager(1);
        let track = bound_track(&mut audio);
        assert!(matches!(audio.play(track, -2, 0), Err(ResourceError::InvalidParameter(_))));
        audio.play(track, -1, 0).unwrap();
    }

    #[test]
    fn test_fades_use_device_sample_rate() {
        let (mut audio, log) = manager(1);
        let track = bound_track(&mut audio);

        audio.play(track, 0, 500).unwrap();
        audio.stop(track, 250).unwrap();
        assert_eq!(audio.track_state(track).unwrap(), TrackState::Stopped);

        let log = log.borrow();
        assert_eq!(log.count(|c| matches!(c, MockCall::Play { fade_in_frames: 24_000, .. })), 1);
        assert_eq!(log.count(|c| matches!(c, MockCall::Stop { fade_out_frames: 12_000, .. })), 1);
    }

    #[test]
    fn test_gain_validation() {
        let (mut audio, _log) = manager(1);
        let track = audio.acquire_track().unwrap();

        assert!(matches!(audio.set_track_gain(track, 1.5), Err(ResourceError::InvalidParameter(_))));
        assert!(matches!(audio.set_track_gain(track, -0.1), Err(ResourceError::InvalidParameter(_))));
        assert!(matches!(audio.set_track_gain(track, f32::NAN), Err(ResourceError::InvalidParameter(_))));
        audio.set_track_gain(track, 0.25).unwrap();
        assert!((audio.track_gain(track).unwrap() - 0.25).abs() < f32::EPSILON);

        assert!(audio.set_master_gain(2.0).is_err());
        audio.set_master_gain(0.5).unwrap();
        assert!((audio.master_gain() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_release_resets_track() {
        let (mut audio, log) = manager(1);
        let track = bound_track(&mut audio);
        audio.play(track, 0, 0).unwrap();
        audio.set_track_gain(track, 0.3).unwrap();
        audio.tag_track(track, "sound").unwrap();
        audio.add_to_group(track, "weapons").unwrap();

        audio.release_track(track).unwrap();
        assert!(audio.group_members("weapons").is_empty());

        let again = audio.acquire_track().unwrap();
        assert_eq!(again, track);
        assert_eq!(audio.track_state(again).unwrap(), TrackState::Idle);
        assert!((audio.track_gain(again).unwrap() - 1.0).abs() < f32::EPSILON);
        assert!(!audio.track_has_tag(again, "sound"));
        assert!(audio.track_group(again).is_none());
        assert!(audio.track_source(again).is_none());

        let voice = audio.tracks[again.key()].voice;
        assert!((log.borrow().voices[&voice].gain - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_group_membership_is_exclusive() {
        let (mut audio, _log) = manager(2);
        let a = bound_track(&mut audio);
        let b = audio.acquire_track().unwrap();

        audio.create_group("ambient");
        audio.add_to_group(a, "ambient").unwrap();
        audio.add_to_group(b, "ambient").unwrap();
        audio.add_to_group(a, "ui").unwrap();

        assert_eq!(audio.group_members("ambient"), vec![b]);
        assert_eq!(audio.group_members("ui"), vec![a]);
        assert_eq!(audio.track_group(a), Some("ui"));

        audio.set_group_gain("ui", 0.4).unwrap();
        assert!((audio.track_gain(a).unwrap() - 0.4).abs() < f32::EPSILON);
        assert!((audio.track_gain(b).unwrap() - 1.0).abs() < f32::EPSILON);

        audio.play(a, -1, 0).unwrap();
        audio.pause_group("ui");
        assert_eq!(audio.track_state(a).unwrap(), TrackState::Paused);
        audio.resume_group("ui");
        audio.stop_group("ui", 0);
        assert_eq!(audio.track_state(a).unwrap(), TrackState::Stopped);

        assert!(audio.remove_from_group(b).unwrap());
        assert!(!audio.remove_from_group(b).unwrap());

        assert!(audio.unload_group("ui"));
        assert!(audio.track_group(a).is_none());
        assert_eq!(audio.clear_groups(), 1);
    }

    #[test]
    fn test_tags_are_additive() {
        let (mut audio, _log) = manager(3);
        let a = bound_track(&mut audio);
        let b = audio.acquire_track().unwrap();
        let c = audio.acquire_track().unwrap();

        audio.tag_track(a, "sound").unwrap();
        audio.tag_track(a, "sound").unwrap();
        audio.tag_track(b, "sound").unwrap();
        audio.untag_track(c, "sound").unwrap();

        let mut tagged = audio.tracks_with_tag("sound");
        tagged.sort_by_key(|t| t.key());
        let mut expected = vec![a, b];
        expected.sort_by_key(|t| t.key());
        assert_eq!(tagged, expected);

        assert_eq!(audio.set_tag_gain("sound", 0.5).unwrap(), 2);
        assert!((audio.track_gain(c).unwrap() - 1.0).abs() < f32::EPSILON);

        audio.play(a, 0, 0).unwrap();
        audio.stop_tag("sound", 0);
        assert_eq!(audio.track_state(a).unwrap(), TrackState::Stopped);
    }

    #[test]
    fn test_sound_loaded_once() {
        let (mut audio, log) = manager(0);
        let first = audio.load_sound("laser.wav").unwrap();
        let second = audio.get_sound("laser.wav").unwrap();
        assert_eq!(first, second);
        assert_eq!(log.borrow().decodes("laser.wav"), 1);
        assert!(audio.sound(first).is_some_and(|s| !s.clip().is_streamed()));

        assert!(audio.unload_sound("laser.wav"));
        assert!(audio.sound(first).is_none());
        audio.get_sound("laser.wav").unwrap();
        assert_eq!(log.borrow().decodes("laser.wav"), 2);
    }

    #[test]
    fn test_music_is_streamed() {
        let (mut audio, _log) = manager(0);
        let music = audio.load_music("theme.ogg").unwrap();
        assert!(audio.music(music).is_some_and(|m| m.clip().is_streamed()));
        assert_eq!(audio.music_count(), 1);
        assert!(!audio.unload_music("other.ogg"));
    }

    #[test]
    fn test_decode_failure_is_load_failure() {
        let (mut audio, log) = manager(0);
        log.borrow_mut().failing_paths.insert(PathBuf::from("broken.wav"));

        assert!(audio.load_sound("broken.wav").is_none());
        assert!(matches!(
            audio.try_load_sound("broken.wav"),
            Err(ResourceError::LoadFailed { kind: AssetKind::Sound, .. })
        ));
        assert_eq!(audio.sound_count(), 0);
    }

    #[test]
    fn test_unload_unbinds_tracks() {
        let (mut audio, log) = manager(1);
        let track = bound_track(&mut audio);
        audio.play(track, -1, 0).unwrap();
        let voice = audio.tracks[track.key()].voice;

        assert!(audio.unload_sound("laser.wav"));
        assert_eq!(audio.track_state(track).unwrap(), TrackState::Idle);
        assert!(audio.track_source(track).is_none());

        let log = log.borrow();
        assert_eq!(log.voices[&voice].clip, None);
        assert_eq!(log.count(|c| matches!(c, MockCall::ReleaseClip(_))), 1);
    }

    #[test]
    fn test_bind_stale_clip_rejected() {
        let (mut audio, _log) = manager(1);
        let sound = audio.load_sound("laser.wav").unwrap();
        audio.unload_sound("laser.wav");
        let track = audio.acquire_track().unwrap();

        assert!(matches!(
            audio.bind(track, Some(sound.into())),
            Err(ResourceError::StaleAsset(AssetKind::Sound))
        ));
        assert_eq!(audio.track_state(track).unwrap(), TrackState::Idle);
    }

    #[test]
    fn test_bind_sound_from_other_manager_rejected() {
        let (mut first, _first_log) = manager(0);
        let (mut second, second_log) = manager(1);
        let foreign = first.load_sound("laser.wav").unwrap();
        // Occupies the same cache slot in the second manager
        second.load_sound("explosion.wav").unwrap();
        let track = second.acquire_track().unwrap();

        assert!(matches!(
            second.bind(track, Some(foreign.into())),
            Err(ResourceError::StaleAsset(AssetKind::Sound))
        ));
        assert_eq!(second.track_state(track).unwrap(), TrackState::Idle);
        assert_eq!(
            second_log.borrow().count(|c| matches!(c, MockCall::SetClip(_, Some(_)))),
            0
        );
    }

    #[test]
    fn test_clear_audio_releases_each_clip_once() {
        let (mut audio, log) = manager(0);
        audio.load_sound("a.wav");
        audio.load_sound("b.wav");
        audio.load_music("theme.ogg");

        assert_eq!(audio.clear_audio(), 3);
        assert_eq!(audio.clear_audio(), 0);
        assert_eq!(log.borrow().count(|c| matches!(c, MockCall::ReleaseClip(_))), 3);
    }

    #[test]
    fn test_update_marks_finished_tracks_stopped() {
        let (mut audio, log) = manager(1);
        let track = bound_track(&mut audio);
        audio.play(track, 0, 0).unwrap();

        log.borrow_mut().finish_all();
        audio.update();
        assert_eq!(audio.tracks[track.key()].state, TrackState::Stopped);
    }

    #[test]
    fn test_teardown_order() {
        let (mut audio, log) = manager(2);
        let track = bound_track(&mut audio);
        audio.play(track, 0, 0).unwrap();
        audio.named_track("music").unwrap();
        audio.load_music("theme.ogg");
        drop(audio);

        let log = log.borrow();
        let stop_all = log.position(|c| matches!(c, MockCall::StopAll(_))).unwrap();
        let first_release = log.position(|c| matches!(c, MockCall::ReleaseClip(_))).unwrap();
        let first_destroy = log.position(|c| matches!(c, MockCall::DestroyVoice(_))).unwrap();
        assert!(stop_all < first_release);
        assert!(first_release < first_destroy);
        assert_eq!(log.count(|c| matches!(c, MockCall::DestroyVoice(_))), 3);
        assert_eq!(log.count(|c| matches!(c, MockCall::ReleaseClip(_))), 2);
        assert_eq!(log.calls.last(), Some(&MockCall::Shutdown));
        assert!(log.voices.is_empty());
    }
}

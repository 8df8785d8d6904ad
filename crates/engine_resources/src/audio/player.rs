//! Playback session
//!
//! [`AudioPlayer`] is the gameplay-facing layer over the resource manager:
//! fire-and-forget sound effects on pooled tracks and one persistent music
//! channel with session-wide volume control.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::resource::audio::{AudioSource, TrackHandle, TrackState};
use crate::resource::{ResourceError, ResourceManager};

/// Name of the persistent music track
pub const MUSIC_TRACK: &str = "music";

/// Tag carried by every sound-effect track the session issues
pub const SOUND_TAG: &str = "sound";

/// Who returns finished sound tracks to the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackReturnPolicy {
    /// The caller releases each track with [`AudioPlayer::release_sound`]
    #[default]
    Manual,
    /// [`AudioPlayer::update`] releases tracks whose playback has stopped
    OnStopped,
}

/// Clamp a volume to [0, 1]; NaN becomes silence
fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Sound effect and music playback session
#[derive(Debug)]
pub struct AudioPlayer {
    music_track: TrackHandle,
    current_music: Option<PathBuf>,
    music_volume: f32,
    sound_volume: f32,
    issued: Vec<TrackHandle>,
    policy: TrackReturnPolicy,
}

impl AudioPlayer {
    /// Start a session, creating the persistent music track
    ///
    /// The return policy comes from the manager's audio configuration.
    pub fn new(resources: &mut ResourceManager) -> Result<Self, ResourceError> {
        let policy = resources.config().audio.track_return;
        let music_track = resources.audio_mut().named_track(MUSIC_TRACK)?;
        log::debug!("Audio session started ({:?} track return)", policy);

        Ok(Self {
            music_track,
            current_music: None,
            music_volume: 1.0,
            sound_volume: 1.0,
            issued: Vec::new(),
            policy,
        })
    }

    /// Play a sound effect once on a pooled track
    ///
    /// `volume` overrides the session sound volume for this effect. Under the
    /// `Manual` return policy the caller owns the returned track and hands it
    /// back with [`Self::release_sound`].
    pub fn play_sound(
        &mut self,
        resources: &mut ResourceManager,
        path: impl AsRef<Path>,
        volume: Option<f32>,
    ) -> Result<TrackHandle, ResourceError> {
        let audio = resources.audio_mut();
        let sound = audio.try_load_sound(path)?;
        let track = audio.acquire_track()?;

        let gain = volume.map_or(self.sound_volume, clamp_volume);
        let started = audio
            .bind(track, Some(AudioSource::Sound(sound)))
            .and_then(|()| audio.tag_track(track, SOUND_TAG))
            .and_then(|()| audio.set_track_gain(track, gain))
            .and_then(|()| audio.play(track, 0, 0));

        if let Err(e) = started {
            if let Err(release) = audio.release_track(track) {
                log::warn!("Failed to return track after playback error: {}", release);
            }
            return Err(e);
        }

        self.issued.push(track);
        Ok(track)
    }

    /// Return a sound track to the pool
    pub fn release_sound(&mut self, resources: &mut ResourceManager, track: TrackHandle) -> Result<(), ResourceError> {
        resources.audio_mut().release_track(track)?;
        self.issued.retain(|&t| t != track);
        Ok(())
    }

    /// Switch the music channel to `path`
    ///
    /// Calling again with the current path does nothing. The previous music
    /// fades out over half of `fade_in_ms`.
    pub fn play_music(
        &mut self,
        resources: &mut ResourceManager,
        path: impl AsRef<Path>,
        loops: i32,
        fade_in_ms: u32,
    ) -> Result<(), ResourceError> {
        let path = path.as_ref();
        let audio = resources.audio_mut();
        // Unloading the music detaches it from the track, which forces a reload here
        if self.current_music.as_deref() == Some(path) && audio.track_source(self.music_track).is_some() {
            return Ok(());
        }

        let had_music = self.current_music.is_some();
        if had_music {
            audio.stop(self.music_track, fade_in_ms / 2)?;
        }

        let track = self.music_track;
        let volume = self.music_volume;
        let result = audio
            .try_load_music(path)
            .and_then(|music| audio.bind(track, Some(AudioSource::Music(music))))
            .and_then(|()| audio.set_track_gain(track, volume))
            .and_then(|()| audio.play(track, loops, fade_in_ms));

        match result {
            Ok(()) => {
                log::info!("Playing music {}", path.display());
                self.current_music = Some(path.to_path_buf());
                Ok(())
            }
            Err(e) => {
                if had_music {
                    log::warn!("Music switch to {} failed, music stopped", path.display());
                }
                self.current_music = None;
                Err(e)
            }
        }
    }

    /// Stop the music, fading out over `fade_out_ms`
    ///
    /// Clears the current path so the same file can be started again.
    pub fn stop_music(&mut self, resources: &mut ResourceManager, fade_out_ms: u32) -> Result<(), ResourceError> {
        self.current_music = None;
        resources.audio_mut().stop(self.music_track, fade_out_ms)
    }

    /// Pause the music if it is playing
    pub fn pause_music(&mut self, resources: &mut ResourceManager) -> Result<(), ResourceError> {
        resources.audio_mut().pause(self.music_track)
    }

    /// Resume the music if it is paused
    pub fn resume_music(&mut self, resources: &mut ResourceManager) -> Result<(), ResourceError> {
        resources.audio_mut().resume(self.music_track)
    }

    /// Set the volume of every current and future sound effect
    pub fn set_sound_volume(&mut self, resources: &mut ResourceManager, volume: f32) {
        self.sound_volume = clamp_volume(volume);
        if let Err(e) = resources.audio_mut().set_tag_gain(SOUND_TAG, self.sound_volume) {
            log::warn!("Failed to apply sound volume: {}", e);
        }
        log::info!("Sound volume set to {:.2}", self.sound_volume);
    }

    /// Set the music volume
    pub fn set_music_volume(&mut self, resources: &mut ResourceManager, volume: f32) {
        self.music_volume = clamp_volume(volume);
        if let Err(e) = resources.audio_mut().set_track_gain(self.music_track, self.music_volume) {
            log::warn!("Failed to apply music volume: {}", e);
        }
        log::info!("Music volume set to {:.2}", self.music_volume);
    }

    /// Session sound volume
    pub const fn sound_volume(&self) -> f32 {
        self.sound_volume
    }

    /// Session music volume
    pub const fn music_volume(&self) -> f32 {
        self.music_volume
    }

    /// Path of the music currently playing
    pub fn current_music(&self) -> Option<&Path> {
        self.current_music.as_deref()
    }

    /// Handle of the persistent music track
    pub const fn music_track(&self) -> TrackHandle {
        self.music_track
    }

    /// Sound tracks issued and not yet released
    pub fn issued_tracks(&self) -> &[TrackHandle] {
        &self.issued
    }

    /// Per-frame update
    pub fn update(&mut self, resources: &mut ResourceManager) {
        resources.update();
        if self.policy != TrackReturnPolicy::OnStopped {
            return;
        }

        let audio = resources.audio_mut();
        self.issued.retain(|&track| {
            let finished = match audio.track_state(track) {
                Ok(state) => state == TrackState::Stopped,
                // Released behind our back
                Err(_) => return false,
            };
            if !finished {
                return true;
            }
            if let Err(e) = audio.release_track(track) {
                log::warn!("Failed to recycle finished sound track: {}", e);
            }
            false
        });
    }
}

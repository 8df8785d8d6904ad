//! Resource management
//!
//! [`ResourceManager`] is the single owner of every loaded asset: textures,
//! fonts (per point size), sound effects and music. Each kind lives in a
//! load-once cache keyed by path; callers hold generational
//! [`AssetHandle`]s that go stale when the entry is evicted.

mod cache;
pub mod audio;
pub mod font;
pub mod image_loader;
pub mod texture;

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use nalgebra::Vector2;
use thiserror::Error;

use crate::audio::backend::{create_backend, AudioBackend};
use crate::audio::{AudioError, Music, Sound};
use crate::config::ResourceConfig;
use crate::foundation::collections::AssetHandle;
use audio::{AudioManager, TrackHandle};
use font::{Font, FontCache};
use texture::{RenderDevice, Texture, TextureCache};

/// Kind of asset a cache holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// GPU texture
    Texture,
    /// Font at one point size
    Font,
    /// Pre-decoded sound effect
    Sound,
    /// Streamed music
    Music,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Texture => "texture",
            Self::Font => "font",
            Self::Sound => "sound",
            Self::Music => "music",
        })
    }
}

/// Ways a track can be misused against the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMisuse {
    /// The track is already back in the free list
    DoubleRelease,
    /// The track was issued by a different mixing device
    ForeignDevice,
    /// The track has been destroyed
    StaleTrack,
    /// Named tracks are never recycled through the pool
    NamedTrack,
}

impl fmt::Display for PoolMisuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DoubleRelease => "track is already in the pool",
            Self::ForeignDevice => "track belongs to another audio device",
            Self::StaleTrack => "track no longer exists",
            Self::NamedTrack => "named tracks cannot be released into the pool",
        })
    }
}

/// Resource management errors
#[derive(Error, Debug)]
pub enum ResourceError {
    /// An asset could not be decoded or uploaded
    #[error("Failed to load {kind} {}: {reason}", path.display())]
    LoadFailed {
        /// Kind of asset
        kind: AssetKind,
        /// Source file
        path: PathBuf,
        /// Decoder or device diagnostic
        reason: String,
    },

    /// An argument was out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The operation is not valid in the track's current state
    #[error("Invalid track state: {0}")]
    InvalidTrackState(String),

    /// A track handle was misused
    #[error("Track handle misuse: {0}")]
    PoolMisuse(PoolMisuse),

    /// No pooled track is free and the pool may not grow
    #[error("Track pool exhausted (capacity {capacity})")]
    PoolExhausted {
        /// Pool capacity at the time of the request
        capacity: usize,
    },

    /// A device or library failed to initialize
    #[error("Failed to initialize {subsystem}: {reason}")]
    DeviceInitFailure {
        /// Subsystem that failed (`"audio"`)
        subsystem: &'static str,
        /// Backend diagnostic
        reason: String,
    },

    /// The asset handle refers to an evicted cache entry
    #[error("Stale {0} handle")]
    StaleAsset(AssetKind),

    /// Backend error from a playback call
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Owner of every cache and the audio subsystem
///
/// Children are dropped fonts first, then audio, then textures.
pub struct ResourceManager {
    fonts: FontCache,
    audio: AudioManager,
    textures: TextureCache,
    config: ResourceConfig,
}

impl ResourceManager {
    /// Create the resource layer with the backend named in the configuration
    ///
    /// # Errors
    /// `DeviceInitFailure` if the audio device cannot be opened.
    pub fn new(device: &Rc<dyn RenderDevice>, config: ResourceConfig) -> Result<Self, ResourceError> {
        let backend = create_backend(config.audio.backend).map_err(|e| ResourceError::DeviceInitFailure {
            subsystem: "audio",
            reason: e.to_string(),
        })?;
        Self::with_backend(device, backend, config)
    }

    /// Create the resource layer on an explicit audio backend
    ///
    /// # Errors
    /// `DeviceInitFailure` if the audio device cannot be opened. The texture
    /// cache built before it is dropped again.
    pub fn with_backend(
        device: &Rc<dyn RenderDevice>,
        backend: Box<dyn AudioBackend>,
        config: ResourceConfig,
    ) -> Result<Self, ResourceError> {
        let textures = TextureCache::new(device);
        let audio = AudioManager::new(backend, &config.audio)?;
        let fonts = FontCache::new();

        log::info!("Resource manager ready");
        Ok(Self {
            fonts,
            audio,
            textures,
            config,
        })
    }

    /// Configuration the manager was built with
    pub const fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// Audio subsystem, for track state queries
    pub const fn audio(&self) -> &AudioManager {
        &self.audio
    }

    /// Audio subsystem, for track, group, tag and master gain control
    pub fn audio_mut(&mut self) -> &mut AudioManager {
        &mut self.audio
    }

    /// Per-frame update
    pub fn update(&mut self) {
        self.audio.update();
    }

    /// Release every cached asset (fonts, then audio, then textures)
    pub fn clear(&mut self) -> usize {
        let released = self.fonts.clear() + self.audio.clear_audio() + self.textures.clear();
        log::debug!("Cleared {} resources", released);
        released
    }

    /// Release every texture while the renderer is still alive
    pub fn release_render_resources(&mut self) -> usize {
        self.textures.clear()
    }

    // Textures

    /// Load a texture (no-op if already cached)
    pub fn load_texture(&mut self, path: impl AsRef<Path>) -> Option<AssetHandle<Texture>> {
        self.textures.load(path.as_ref())
    }

    /// Cached texture, loaded on a miss
    pub fn get_texture(&mut self, path: impl AsRef<Path>) -> Option<AssetHandle<Texture>> {
        self.textures.get(path.as_ref())
    }

    /// Evict a texture, destroying it on the device
    pub fn unload_texture(&mut self, path: impl AsRef<Path>) -> bool {
        self.textures.unload(path.as_ref())
    }

    /// Evict every texture
    pub fn clear_textures(&mut self) -> usize {
        self.textures.clear()
    }

    /// Texture behind a handle
    pub fn texture(&self, handle: AssetHandle<Texture>) -> Option<&Texture> {
        self.textures.resolve(handle)
    }

    /// Size of a texture in pixels, loading it if needed
    pub fn texture_size(&mut self, path: impl AsRef<Path>) -> Option<Vector2<f32>> {
        self.textures.texture_size(path.as_ref())
    }

    /// Whether a texture is cached
    pub fn has_texture(&self, path: impl AsRef<Path>) -> bool {
        self.textures.contains(path.as_ref())
    }

    /// Number of cached textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    // Fonts

    /// Load a font at `point_size` (no-op if already cached)
    pub fn load_font(&mut self, path: impl AsRef<Path>, point_size: u32) -> Option<AssetHandle<Font>> {
        self.fonts.load(path.as_ref(), point_size)
    }

    /// Cached font at `point_size`, loaded on a miss
    pub fn get_font(&mut self, path: impl AsRef<Path>, point_size: u32) -> Option<AssetHandle<Font>> {
        self.fonts.get(path.as_ref(), point_size)
    }

    /// Evict one size of a font
    pub fn unload_font(&mut self, path: impl AsRef<Path>, point_size: u32) -> bool {
        self.fonts.unload(path.as_ref(), point_size)
    }

    /// Evict every font
    pub fn clear_fonts(&mut self) -> usize {
        self.fonts.clear()
    }

    /// Font behind a handle
    pub fn font(&self, handle: AssetHandle<Font>) -> Option<&Font> {
        self.fonts.resolve(handle)
    }

    /// Number of cached fonts (each size counts separately)
    pub fn font_count(&self) -> usize {
        self.fonts.len()
    }

    // Sounds

    /// Decode a sound effect (no-op if already cached)
    pub fn load_sound(&mut self, path: impl AsRef<Path>) -> Option<AssetHandle<Sound>> {
        self.audio.load_sound(path)
    }

    /// Cached sound effect, decoded on a miss
    pub fn get_sound(&mut self, path: impl AsRef<Path>) -> Option<AssetHandle<Sound>> {
        self.audio.get_sound(path)
    }

    /// Evict a sound effect, unbinding tracks that play it
    pub fn unload_sound(&mut self, path: impl AsRef<Path>) -> bool {
        self.audio.unload_sound(path)
    }

    /// Evict every sound effect
    pub fn clear_sounds(&mut self) -> usize {
        self.audio.clear_sounds()
    }

    /// Sound effect behind a handle
    pub fn sound(&self, handle: AssetHandle<Sound>) -> Option<&Sound> {
        self.audio.sound(handle)
    }

    // Music

    /// Validate a music file (no-op if already cached)
    pub fn load_music(&mut self, path: impl AsRef<Path>) -> Option<AssetHandle<Music>> {
        self.audio.load_music(path)
    }

    /// Cached music, loaded on a miss
    pub fn get_music(&mut self, path: impl AsRef<Path>) -> Option<AssetHandle<Music>> {
        self.audio.get_music(path)
    }

    /// Evict a music file, unbinding tracks that play it
    pub fn unload_music(&mut self, path: impl AsRef<Path>) -> bool {
        self.audio.unload_music(path)
    }

    /// Evict every music file
    pub fn clear_music(&mut self) -> usize {
        self.audio.clear_music()
    }

    /// Music behind a handle
    pub fn music(&self, handle: AssetHandle<Music>) -> Option<&Music> {
        self.audio.music(handle)
    }

    /// Return a pooled track, see [`AudioManager::release_track`]
    pub fn release_track(&mut self, track: TrackHandle) -> Result<(), ResourceError> {
        self.audio.release_track(track)
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        log::trace!("Destroying resource manager");
    }
}

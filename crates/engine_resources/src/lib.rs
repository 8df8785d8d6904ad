//! # Engine Resources
//!
//! Asset caching and audio track lifecycle for the engine runtime.
//!
//! ## Features
//!
//! - **Keyed Caches**: Load-once textures, fonts (per point size), sound effects and music
//! - **Track Pool**: Reusable mixing channels with overflow accounting
//! - **Named Tracks, Groups and Tags**: Persistent channels and batch control
//! - **Playback Session**: Fire-and-forget sounds and a single persistent music channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use engine_resources::prelude::*;
//! use std::rc::Rc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device: Rc<dyn RenderDevice> = Rc::new(HeadlessRenderDevice::new());
//!     let mut resources = ResourceManager::new(&device, ResourceConfig::default())?;
//!     let mut player = AudioPlayer::new(&mut resources)?;
//!
//!     player.play_music(&mut resources, "resources/audio/theme.ogg", -1, 500)?;
//!     let track = player.play_sound(&mut resources, "resources/audio/laser.wav", None)?;
//!
//!     // ... once the effect is no longer needed
//!     player.release_sound(&mut resources, track)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod audio;
pub mod resource;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        audio::{
            AudioError, AudioPlayer, TrackReturnPolicy,
            backend::{AudioBackend, AudioBackendConfig, AudioBackendKind},
        },
        config::{AudioConfig, Config, ResourceConfig},
        foundation::collections::AssetHandle,
        resource::{
            AssetKind, ResourceError, ResourceManager,
            audio::{AudioManager, AudioSource, OverflowPolicy, TrackHandle, TrackState},
            font::{Font, FontKey},
            texture::{HeadlessRenderDevice, RenderDevice, Texture, TextureId},
        },
    };
}

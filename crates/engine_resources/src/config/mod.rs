//! Configuration system

pub use serde::{Serialize, Deserialize};

use crate::audio::backend::{AudioBackendConfig, AudioBackendKind};
use crate::audio::TrackReturnPolicy;
use crate::resource::audio::OverflowPolicy;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Load configuration from file, falling back to defaults if it is missing or invalid
    fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Using default configuration ({}): {}", path, e);
                Self::default()
            }
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Top-level configuration for the resource layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Audio subsystem settings
    pub audio: AudioConfig,
}

impl Config for ResourceConfig {}

/// Audio subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Number of pooled tracks allocated up front
    pub track_pool_size: usize,

    /// What happens when the pool runs dry
    pub overflow: OverflowPolicy,

    /// Whether the playback session recycles finished sound tracks itself
    pub track_return: TrackReturnPolicy,

    /// Which audio backend drives the output
    pub backend: AudioBackendKind,

    /// Output device parameters
    pub device: AudioBackendConfig,
}

impl AudioConfig {
    /// Default number of pooled tracks
    pub const DEFAULT_TRACK_POOL_SIZE: usize = 16;
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            track_pool_size: Self::DEFAULT_TRACK_POOL_SIZE,
            overflow: OverflowPolicy::default(),
            track_return: TrackReturnPolicy::default(),
            backend: AudioBackendKind::default(),
            device: AudioBackendConfig::default(),
        }
    }
}

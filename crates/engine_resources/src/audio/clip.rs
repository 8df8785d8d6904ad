//! Audio clip types shared by every backend
//!
//! An [`AudioClip`] describes one decoded file. Sound effects carry their
//! interleaved samples in memory; music clips only carry the stream
//! parameters and are re-opened from disk each time they are played.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::AudioError;

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// WAV uncompressed
    Wav,
    /// OGG Vorbis compressed
    Ogg,
    /// MP3 compressed
    Mp3,
    /// FLAC lossless
    Flac,
    /// Unknown format
    Unknown,
}

impl AudioFormat {
    /// Detect audio format from magic bytes
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.len() < 4 {
            return Self::Unknown;
        }

        match &bytes[0..4] {
            b"RIFF" => Self::Wav,
            b"OggS" => Self::Ogg,
            b"fLaC" => Self::Flac,
            // MP3 can start with ID3 tag or frame sync
            [0xFF, 0xFB, _, _] | [0xFF, 0xFA, _, _] | [b'I', b'D', b'3', _] => Self::Mp3,
            _ => Self::Unknown,
        }
    }

    /// Read the first bytes of a file and detect its format
    ///
    /// # Errors
    /// - `Io` if the file cannot be opened or read
    /// - `UnsupportedFormat` if the magic bytes are not recognised
    pub fn sniff(path: &Path) -> Result<Self, AudioError> {
        let mut header = Vec::with_capacity(4);
        File::open(path)?.take(4).read_to_end(&mut header)?;

        match Self::detect(&header) {
            Self::Unknown => Err(AudioError::UnsupportedFormat(path.to_path_buf())),
            format => Ok(format),
        }
    }
}

/// How a backend should prepare a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Decode the whole file into memory up front (short effects)
    Predecoded,
    /// Validate the file and decode it while playing (long music)
    Streamed,
}

/// A decoded (or stream-ready) audio file
#[derive(Debug, Clone)]
pub struct AudioClip {
    path: PathBuf,
    format: AudioFormat,
    channels: u16,
    sample_rate: u32,
    duration: Option<Duration>,
    samples: Option<Arc<[f32]>>,
}

impl AudioClip {
    /// Create a clip whose interleaved samples live in memory
    pub fn predecoded(
        path: impl Into<PathBuf>,
        format: AudioFormat,
        channels: u16,
        sample_rate: u32,
        samples: Vec<f32>,
    ) -> Self {
        let frames = samples.len() / usize::from(channels.max(1));
        let duration = (sample_rate > 0)
            .then(|| Duration::from_secs_f64(frames as f64 / f64::from(sample_rate)));

        Self {
            path: path.into(),
            format,
            channels,
            sample_rate,
            duration,
            samples: Some(samples.into()),
        }
    }

    /// Create a clip that is streamed from its file on every play
    pub fn streamed(
        path: impl Into<PathBuf>,
        format: AudioFormat,
        channels: u16,
        sample_rate: u32,
        duration: Option<Duration>,
    ) -> Self {
        Self {
            path: path.into(),
            format,
            channels,
            sample_rate,
            duration,
            samples: None,
        }
    }

    /// Source file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Container format detected at load time
    pub const fn format(&self) -> AudioFormat {
        self.format
    }

    /// Number of interleaved channels
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Native sample rate of the file
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of one pass through the clip, if known
    pub const fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// In-memory samples, `None` for streamed clips
    pub fn samples(&self) -> Option<&Arc<[f32]>> {
        self.samples.as_ref()
    }

    /// Whether the clip is decoded while playing
    pub const fn is_streamed(&self) -> bool {
        self.samples.is_none()
    }
}

/// A short, fully decoded sound effect owned by the sound cache
#[derive(Debug)]
pub struct Sound {
    clip: AudioClip,
}

impl Sound {
    pub(crate) const fn new(clip: AudioClip) -> Self {
        Self { clip }
    }

    /// The decoded clip
    pub const fn clip(&self) -> &AudioClip {
        &self.clip
    }
}

/// A streamed music file owned by the music cache
#[derive(Debug)]
pub struct Music {
    clip: AudioClip,
}

impl Music {
    pub(crate) const fn new(clip: AudioClip) -> Self {
        Self { clip }
    }

    /// The stream description
    pub const fn clip(&self) -> &AudioClip {
        &self.clip
    }
}

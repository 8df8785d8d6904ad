//! Rodio audio backend implementation
//!
//! Uses the Rodio library for cross-platform audio playback.
//! Rodio is pure Rust and supports WAV, OGG Vorbis, MP3, and FLAC formats.
//!
//! Every voice owns at most one [`Sink`]; a new sink is created on each
//! `play` so a previous playback never leaks into the next one. Sound
//! clips play from their in-memory samples, music clips are decoded on the
//! fly and re-opened at the start of each loop pass.
//!
//! # Example
//!
//! ```no_run
//! use engine_resources::audio::backend::{AudioBackend, AudioBackendConfig};
//! use engine_resources::audio::backend::rodio_backend::RodioBackend;
//! use engine_resources::audio::DecodeMode;
//! use std::path::Path;
//!
//! let mut backend = RodioBackend::new();
//! backend.initialize(&AudioBackendConfig::default()).unwrap();
//!
//! let clip = backend.decode(Path::new("resources/audio/sound.wav"), DecodeMode::Predecoded).unwrap();
//! let voice = backend.create_voice().unwrap();
//! backend.set_voice_clip(voice, Some(&clip)).unwrap();
//! backend.play(voice, 0, 0).unwrap();
//!
//! backend.update(); // Drops finished sinks
//! backend.shutdown();
//! ```

use super::{AudioBackend, AudioBackendConfig, VoiceId};
use crate::audio::{AudioClip, AudioError, AudioFormat, DecodeMode};
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::source::SamplesConverter;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Convert a frame count at `sample_rate` into wall-clock time
fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    let nanos = u128::from(frames) * 1_000_000_000 / u128::from(sample_rate.max(1));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Fade-out request shared between the main thread and the mixer thread
#[derive(Debug, Default)]
struct FadeControl {
    /// Requested fade length in microseconds, 0 while no fade is pending
    micros: AtomicU64,
    /// Samples already attenuated
    elapsed: AtomicU64,
    /// Set by the mixer thread once the ramp reached silence
    finished: AtomicBool,
}

impl FadeControl {
    fn request(&self, length: Duration) {
        let micros = u64::try_from(length.as_micros()).unwrap_or(u64::MAX);
        self.micros.store(micros, Ordering::Relaxed);
    }

    fn is_fading(&self) -> bool {
        self.micros.load(Ordering::Relaxed) > 0 && !self.finished.load(Ordering::Relaxed)
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Source wrapper that ramps to silence once a fade-out is requested
///
/// The ramp length is counted in the wrapped source's own samples, so a
/// 22.05 kHz clip on a 48 kHz device still fades over the requested time.
struct FadeOut<S> {
    inner: S,
    control: Arc<FadeControl>,
}

impl<S> FadeOut<S>
where
    S: Source<Item = f32>,
{
    fn ramp_samples(&self, micros: u64) -> u64 {
        let per_second = u128::from(self.inner.sample_rate().max(1))
            * u128::from(self.inner.channels().max(1));
        let total = u128::from(micros) * per_second / 1_000_000;
        u64::try_from(total).unwrap_or(u64::MAX).max(1)
    }
}

impl<S> Iterator for FadeOut<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.control.is_finished() {
            return None;
        }

        let sample = self.inner.next()?;
        let micros = self.control.micros.load(Ordering::Relaxed);
        if micros == 0 {
            return Some(sample);
        }

        let total = self.ramp_samples(micros);
        let elapsed = self.control.elapsed.fetch_add(1, Ordering::Relaxed);
        if elapsed >= total {
            self.control.finished.store(true, Ordering::Relaxed);
            return None;
        }

        Some(sample * (1.0 - elapsed as f32 / total as f32))
    }
}

impl<S> Source for FadeOut<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

/// Plays a predecoded clip straight out of its shared sample buffer
///
/// `passes` of `None` repeats forever.
struct ClipSource {
    samples: Arc<[f32]>,
    position: usize,
    channels: u16,
    sample_rate: u32,
    passes: Option<u32>,
    pass: u32,
}

impl ClipSource {
    fn new(clip: &AudioClip, samples: &Arc<[f32]>, passes: Option<u32>) -> Self {
        Self {
            samples: Arc::clone(samples),
            position: 0,
            channels: clip.channels(),
            sample_rate: clip.sample_rate(),
            passes,
            pass: 0,
        }
    }
}

impl Iterator for ClipSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.position >= self.samples.len() {
            if self.samples.is_empty() {
                return None;
            }
            self.pass = self.pass.saturating_add(1);
            if self.passes.is_some_and(|passes| self.pass >= passes) {
                return None;
            }
            self.position = 0;
        }
        let sample = self.samples[self.position];
        self.position += 1;
        Some(sample)
    }
}

impl Source for ClipSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        let passes = self.passes?;
        let frames = self.samples.len() / usize::from(self.channels.max(1));
        let pass = frames_to_duration(frames as u64, self.sample_rate);
        Some(pass * passes)
    }
}

type FileDecoder = SamplesConverter<Decoder<BufReader<File>>, f32>;

/// Decodes a music file on the fly, reopening it for each further pass
///
/// Only one file handle is open at a time. `passes` of `None` repeats forever.
struct StreamSource {
    path: PathBuf,
    decoder: Option<FileDecoder>,
    channels: u16,
    sample_rate: u32,
    remaining: Option<u32>,
    pass_yielded: bool,
}

impl StreamSource {
    fn open(path: &Path, passes: Option<u32>) -> Result<Self, AudioError> {
        let decoder = RodioBackend::open_decoder(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            channels: decoder.channels(),
            sample_rate: decoder.sample_rate(),
            decoder: Some(decoder.convert_samples()),
            remaining: passes.map(|passes| passes.saturating_sub(1)),
            pass_yielded: false,
        })
    }
}

impl Iterator for StreamSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        loop {
            let decoder = self.decoder.as_mut()?;
            if let Some(sample) = decoder.next() {
                self.pass_yielded = true;
                return Some(sample);
            }

            // A pass that produced nothing would reopen forever
            if !self.pass_yielded || self.remaining == Some(0) {
                self.decoder = None;
                return None;
            }
            self.remaining = self.remaining.map(|n| n - 1);

            match RodioBackend::open_decoder(&self.path) {
                Ok(decoder) => {
                    self.decoder = Some(decoder.convert_samples());
                    self.pass_yielded = false;
                }
                Err(e) => {
                    log::warn!("Failed to reopen {} for the next loop pass: {}", self.path.display(), e);
                    self.decoder = None;
                    return None;
                }
            }
        }
    }
}

impl Source for StreamSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// One playback voice
struct Voice {
    clip: Option<AudioClip>,
    sink: Option<Sink>,
    fade: Arc<FadeControl>,
    gain: f32,
}

impl Voice {
    fn new() -> Self {
        Self {
            clip: None,
            sink: None,
            fade: Arc::new(FadeControl::default()),
            gain: 1.0,
        }
    }

    /// Halt the current sink, letting a pending fade-out finish on its own
    fn halt(&mut self) {
        if let Some(sink) = self.sink.take() {
            if self.fade.is_fading() {
                sink.detach();
            } else {
                sink.stop();
            }
        }
    }
}

/// Rodio-based audio backend
pub struct RodioBackend {
    /// Audio output stream (must be kept alive)
    _output_stream: Option<OutputStream>,
    /// Output stream handle for creating sinks
    stream_handle: Option<OutputStreamHandle>,
    /// Live voices
    voices: HashMap<VoiceId, Voice>,
    /// Next voice ID
    next_id: u32,
    /// Native rate of the output device
    sample_rate: u32,
    /// Device-wide gain multiplied into every sink
    master_gain: f32,
    /// Initialization state
    initialized: bool,
}

impl RodioBackend {
    /// Create a new Rodio backend
    pub fn new() -> Self {
        Self {
            _output_stream: None,
            stream_handle: None,
            voices: HashMap::new(),
            next_id: 0,
            sample_rate: AudioBackendConfig::default().sample_rate,
            master_gain: 1.0,
            initialized: false,
        }
    }

    fn voice(&self, voice: VoiceId) -> Result<&Voice, AudioError> {
        self.voices.get(&voice).ok_or(AudioError::InvalidHandle)
    }

    fn voice_mut(&mut self, voice: VoiceId) -> Result<&mut Voice, AudioError> {
        self.voices.get_mut(&voice).ok_or(AudioError::InvalidHandle)
    }

    fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, AudioError> {
        let file = File::open(path)?;
        Decoder::new(BufReader::new(file)).map_err(|e| AudioError::DecodeFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Queue one playback of `clip` on `sink` as a single source
    ///
    /// Loop passes are produced inside the source, so the fade-in only
    /// touches the start of the first pass.
    fn queue_clip(
        sink: &Sink,
        clip: &AudioClip,
        loops: i32,
        fade_in: Duration,
        fade: &Arc<FadeControl>,
    ) -> Result<(), AudioError> {
        let passes = u32::try_from(loops).ok().map(|loops| loops.saturating_add(1));

        match clip.samples() {
            Some(samples) => {
                let source = ClipSource::new(clip, samples, passes).fade_in(fade_in);
                sink.append(FadeOut { inner: source, control: Arc::clone(fade) });
            }
            None => {
                let source = StreamSource::open(clip.path(), passes)?.fade_in(fade_in);
                sink.append(FadeOut { inner: source, control: Arc::clone(fade) });
            }
        }
        Ok(())
    }
}

impl AudioBackend for RodioBackend {
    fn initialize(&mut self, config: &AudioBackendConfig) -> Result<(), AudioError> {
        if self.initialized {
            return Ok(());
        }

        let host = rodio::cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            AudioError::BackendInitFailed("No default audio output device".to_string())
        })?;

        self.sample_rate = match device.default_output_config() {
            Ok(supported) => supported.sample_rate().0,
            Err(e) => {
                log::warn!("Output device did not report a sample rate ({}), assuming {} Hz", e, config.sample_rate);
                config.sample_rate
            }
        };

        // Create output stream
        let (stream, stream_handle) = OutputStream::try_from_device(&device)
            .map_err(|e| AudioError::BackendInitFailed(format!("Failed to create audio output: {}", e)))?;

        self._output_stream = Some(stream);
        self.stream_handle = Some(stream_handle);
        self.initialized = true;

        log::info!("Rodio audio backend initialized ({} Hz)", self.sample_rate);
        Ok(())
    }

    fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }

        for (_id, mut voice) in self.voices.drain() {
            if let Some(sink) = voice.sink.take() {
                sink.stop();
            }
        }

        // Drop stream handle and output
        self.stream_handle = None;
        self._output_stream = None;
        self.initialized = false;

        log::info!("Rodio audio backend shutdown");
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn update(&mut self) {
        // Drop finished sinks
        for voice in self.voices.values_mut() {
            if voice.sink.as_ref().is_some_and(Sink::empty) {
                voice.sink = None;
            }
        }
    }

    fn decode(&mut self, path: &Path, mode: DecodeMode) -> Result<AudioClip, AudioError> {
        if !self.initialized {
            return Err(AudioError::BackendNotInitialized);
        }

        let format = AudioFormat::sniff(path)?;
        let decoder = Self::open_decoder(path)?;
        let channels = decoder.channels();
        let sample_rate = decoder.sample_rate();

        let clip = match mode {
            DecodeMode::Predecoded => {
                let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();
                AudioClip::predecoded(path, format, channels, sample_rate, samples)
            }
            DecodeMode::Streamed => {
                let duration = decoder.total_duration();
                AudioClip::streamed(path, format, channels, sample_rate, duration)
            }
        };
        Ok(clip)
    }

    fn create_voice(&mut self) -> Result<VoiceId, AudioError> {
        if !self.initialized {
            return Err(AudioError::BackendNotInitialized);
        }
        let id = VoiceId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.voices.insert(id, Voice::new());
        Ok(id)
    }

    fn destroy_voice(&mut self, voice: VoiceId) {
        if let Some(mut voice) = self.voices.remove(&voice) {
            if let Some(sink) = voice.sink.take() {
                sink.stop();
            }
        }
    }

    fn set_voice_clip(&mut self, voice: VoiceId, clip: Option<&AudioClip>) -> Result<(), AudioError> {
        let v = self.voice_mut(voice)?;
        v.halt();
        v.clip = clip.cloned();
        Ok(())
    }

    fn play(&mut self, voice: VoiceId, loops: i32, fade_in_frames: u64) -> Result<(), AudioError> {
        let stream_handle = self.stream_handle.as_ref()
            .ok_or(AudioError::BackendNotInitialized)?;
        let sample_rate = self.sample_rate;
        let master_gain = self.master_gain;

        let v = self.voices.get_mut(&voice).ok_or(AudioError::InvalidHandle)?;
        let clip = v.clip.as_ref()
            .ok_or_else(|| AudioError::PlaybackFailed("no clip attached".to_string()))?;

        let sink = Sink::try_new(stream_handle)
            .map_err(|e| AudioError::PlaybackFailed(format!("Failed to create sink: {}", e)))?;
        sink.set_volume(v.gain * master_gain);

        let fade = Arc::new(FadeControl::default());
        let fade_in = frames_to_duration(fade_in_frames, sample_rate);
        Self::queue_clip(&sink, clip, loops, fade_in, &fade)?;

        v.halt();
        v.fade = fade;
        v.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self, voice: VoiceId, fade_out_frames: u64) -> Result<(), AudioError> {
        let fade_out = frames_to_duration(fade_out_frames, self.sample_rate);
        let v = self.voice_mut(voice)?;
        let Some(sink) = v.sink.as_ref() else {
            return Ok(());
        };

        if fade_out.as_micros() == 0 || sink.is_paused() {
            v.fade.request(Duration::ZERO);
            if let Some(sink) = v.sink.take() {
                sink.stop();
            }
        } else {
            v.fade.request(fade_out);
        }
        Ok(())
    }

    fn pause(&mut self, voice: VoiceId) -> Result<(), AudioError> {
        if let Some(sink) = &self.voice(voice)?.sink {
            sink.pause();
        }
        Ok(())
    }

    fn resume(&mut self, voice: VoiceId) -> Result<(), AudioError> {
        if let Some(sink) = &self.voice(voice)?.sink {
            sink.play();
        }
        Ok(())
    }

    fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<(), AudioError> {
        let master_gain = self.master_gain;
        let v = self.voice_mut(voice)?;
        v.gain = gain;
        if let Some(sink) = &v.sink {
            sink.set_volume(gain * master_gain);
        }
        Ok(())
    }

    fn gain(&self, voice: VoiceId) -> Result<f32, AudioError> {
        Ok(self.voice(voice)?.gain)
    }

    fn is_playing(&self, voice: VoiceId) -> bool {
        self.voices.get(&voice)
            .and_then(|v| v.sink.as_ref().map(|sink| (v, sink)))
            .map(|(v, sink)| !sink.is_paused() && !sink.empty() && !v.fade.is_finished())
            .unwrap_or(false)
    }

    fn set_master_gain(&mut self, gain: f32) -> Result<(), AudioError> {
        self.master_gain = gain;
        for voice in self.voices.values() {
            if let Some(sink) = &voice.sink {
                sink.set_volume(voice.gain * gain);
            }
        }
        Ok(())
    }

    fn stop_all(&mut self, fade_out_frames: u64) {
        let ids: Vec<VoiceId> = self.voices.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.stop(id, fade_out_frames) {
                log::warn!("Failed to stop voice {:?}: {}", id, e);
            }
        }
    }
}

impl Default for RodioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

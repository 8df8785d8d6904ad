//! Recording backend for unit tests
//!
//! Never touches the filesystem: decoding succeeds for any path that was not
//! registered as failing. Every call is appended to a shared [`MockLog`] that
//! the test keeps a handle to after boxing the backend.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{AudioBackend, AudioBackendConfig, VoiceId};
use crate::audio::{AudioClip, AudioError, AudioFormat, DecodeMode};

pub(crate) const MOCK_SAMPLE_RATE: u32 = 48_000;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MockCall {
    Initialize,
    Shutdown,
    Decode(PathBuf),
    ReleaseClip(PathBuf),
    CreateVoice(VoiceId),
    DestroyVoice(VoiceId),
    SetClip(VoiceId, Option<PathBuf>),
    Play { voice: VoiceId, loops: i32, fade_in_frames: u64 },
    Stop { voice: VoiceId, fade_out_frames: u64 },
    Pause(VoiceId),
    Resume(VoiceId),
    SetGain(VoiceId, f32),
    SetMasterGain(f32),
    StopAll(u64),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockVoice {
    pub clip: Option<PathBuf>,
    pub playing: bool,
    pub paused: bool,
    pub gain: f32,
}

#[derive(Debug, Default)]
pub(crate) struct MockLog {
    pub calls: Vec<MockCall>,
    pub voices: HashMap<VoiceId, MockVoice>,
    pub fail_init: bool,
    pub failing_paths: HashSet<PathBuf>,
    pub master_gain: f32,
    /// `create_voice` fails once this many voices have been created
    pub fail_voice_after: Option<u32>,
    initialized: bool,
    next_id: u32,
}

impl MockLog {
    /// Number of times `path` was decoded
    pub fn decodes(&self, path: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, MockCall::Decode(p) if p == Path::new(path)))
            .count()
    }

    /// Number of recorded calls matching `pred`
    pub fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Position of the first call matching `pred`
    pub fn position(&self, pred: impl Fn(&MockCall) -> bool) -> Option<usize> {
        self.calls.iter().position(pred)
    }

    /// Simulate a voice running out of audio
    pub fn finish(&mut self, voice: VoiceId) {
        if let Some(v) = self.voices.get_mut(&voice) {
            v.playing = false;
        }
    }

    /// Simulate every voice running out of audio
    pub fn finish_all(&mut self) {
        for v in self.voices.values_mut() {
            v.playing = false;
        }
    }
}

pub(crate) struct MockBackend {
    log: Rc<RefCell<MockLog>>,
}

impl MockBackend {
    pub fn new() -> (Self, Rc<RefCell<MockLog>>) {
        let log = Rc::new(RefCell::new(MockLog {
            master_gain: 1.0,
            ..MockLog::default()
        }));
        (Self { log: Rc::clone(&log) }, log)
    }

    /// A backend whose `initialize` fails
    pub fn failing() -> (Self, Rc<RefCell<MockLog>>) {
        let (backend, log) = Self::new();
        log.borrow_mut().fail_init = true;
        (backend, log)
    }

    fn with_voice<R>(
        &self,
        voice: VoiceId,
        call: MockCall,
        f: impl FnOnce(&mut MockVoice) -> R,
    ) -> Result<R, AudioError> {
        let mut log = self.log.borrow_mut();
        log.calls.push(call);
        log.voices.get_mut(&voice).map(f).ok_or(AudioError::InvalidHandle)
    }
}

impl AudioBackend for MockBackend {
    fn initialize(&mut self, _config: &AudioBackendConfig) -> Result<(), AudioError> {
        let mut log = self.log.borrow_mut();
        log.calls.push(MockCall::Initialize);
        if log.fail_init {
            return Err(AudioError::BackendInitFailed("mock device unavailable".to_string()));
        }
        log.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut log = self.log.borrow_mut();
        log.calls.push(MockCall::Shutdown);
        log.initialized = false;
    }

    fn is_initialized(&self) -> bool {
        self.log.borrow().initialized
    }

    fn sample_rate(&self) -> u32 {
        MOCK_SAMPLE_RATE
    }

    fn update(&mut self) {}

    fn decode(&mut self, path: &Path, mode: DecodeMode) -> Result<AudioClip, AudioError> {
        let mut log = self.log.borrow_mut();
        log.calls.push(MockCall::Decode(path.to_path_buf()));
        if log.failing_paths.contains(path) {
            return Err(AudioError::DecodeFailed {
                path: path.to_path_buf(),
                reason: "mock decode failure".to_string(),
            });
        }
        Ok(match mode {
            DecodeMode::Predecoded => {
                AudioClip::predecoded(path, AudioFormat::Wav, 1, MOCK_SAMPLE_RATE, vec![0.0; 480])
            }
            DecodeMode::Streamed => AudioClip::streamed(path, AudioFormat::Ogg, 2, MOCK_SAMPLE_RATE, None),
        })
    }

    fn release_clip(&mut self, clip: &AudioClip) {
        self.log
            .borrow_mut()
            .calls
            .push(MockCall::ReleaseClip(clip.path().to_path_buf()));
    }

    fn create_voice(&mut self) -> Result<VoiceId, AudioError> {
        let mut log = self.log.borrow_mut();
        if log.fail_voice_after.is_some_and(|limit| log.next_id >= limit) {
            return Err(AudioError::PlaybackFailed("mock voice limit reached".to_string()));
        }
        let id = VoiceId(log.next_id);
        log.next_id += 1;
        log.calls.push(MockCall::CreateVoice(id));
        log.voices.insert(id, MockVoice { gain: 1.0, ..MockVoice::default() });
        Ok(id)
    }

    fn destroy_voice(&mut self, voice: VoiceId) {
        let mut log = self.log.borrow_mut();
        log.calls.push(MockCall::DestroyVoice(voice));
        log.voices.remove(&voice);
    }

    fn set_voice_clip(&mut self, voice: VoiceId, clip: Option<&AudioClip>) -> Result<(), AudioError> {
        let path = clip.map(|c| c.path().to_path_buf());
        self.with_voice(voice, MockCall::SetClip(voice, path.clone()), |v| {
            v.clip = path;
            v.playing = false;
            v.paused = false;
        })
    }

    fn play(&mut self, voice: VoiceId, loops: i32, fade_in_frames: u64) -> Result<(), AudioError> {
        let call = MockCall::Play { voice, loops, fade_in_frames };
        self.with_voice(voice, call, |v| {
            if v.clip.is_some() {
                v.playing = true;
                v.paused = false;
                Ok(())
            } else {
                Err(AudioError::PlaybackFailed("no clip attached".to_string()))
            }
        })?
    }

    fn stop(&mut self, voice: VoiceId, fade_out_frames: u64) -> Result<(), AudioError> {
        self.with_voice(voice, MockCall::Stop { voice, fade_out_frames }, |v| {
            v.playing = false;
            v.paused = false;
        })
    }

    fn pause(&mut self, voice: VoiceId) -> Result<(), AudioError> {
        self.with_voice(voice, MockCall::Pause(voice), |v| v.paused = true)
    }

    fn resume(&mut self, voice: VoiceId) -> Result<(), AudioError> {
        self.with_voice(voice, MockCall::Resume(voice), |v| v.paused = false)
    }

    fn set_gain(&mut self, voice: VoiceId, gain: f32) -> Result<(), AudioError> {
        self.with_voice(voice, MockCall::SetGain(voice, gain), |v| v.gain = gain)
    }

    fn gain(&self, voice: VoiceId) -> Result<f32, AudioError> {
        self.log
            .borrow()
            .voices
            .get(&voice)
            .map(|v| v.gain)
            .ok_or(AudioError::InvalidHandle)
    }

    fn is_playing(&self, voice: VoiceId) -> bool {
        self.log
            .borrow()
            .voices
            .get(&voice)
            .is_some_and(|v| v.playing && !v.paused)
    }

    fn set_master_gain(&mut self, gain: f32) -> Result<(), AudioError> {
        let mut log = self.log.borrow_mut();
        log.calls.push(MockCall::SetMasterGain(gain));
        log.master_gain = gain;
        Ok(())
    }

    fn stop_all(&mut self, fade_out_frames: u64) {
        let mut log = self.log.borrow_mut();
        log.calls.push(MockCall::StopAll(fade_out_frames));
        for v in log.voices.values_mut() {
            v.playing = false;
            v.paused = false;
        }
    }
}

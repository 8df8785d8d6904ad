//! Mixing device
//!
//! Owns the audio backend for the lifetime of one [`super::AudioManager`].
//! Opening the device initializes the backend; dropping it shuts the backend
//! down, so it must be the last audio object to go.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::audio::backend::{ms_to_frames, AudioBackend, AudioBackendConfig};
use crate::resource::ResourceError;

static NEXT_DEVICE_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique identity of a mixing device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(u32);

impl DeviceId {
    fn next() -> Self {
        Self(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) struct MixingDevice {
    id: DeviceId,
    backend: Box<dyn AudioBackend>,
    master_gain: f32,
}

impl MixingDevice {
    /// Initialize `backend` and take ownership of it
    ///
    /// # Errors
    /// `DeviceInitFailure` naming the audio subsystem if the backend fails to start.
    pub fn open(mut backend: Box<dyn AudioBackend>, config: &AudioBackendConfig) -> Result<Self, ResourceError> {
        backend.initialize(config).map_err(|e| ResourceError::DeviceInitFailure {
            subsystem: "audio",
            reason: e.to_string(),
        })?;

        let id = DeviceId::next();
        log::info!("Opened audio device {:?} at {} Hz", id, backend.sample_rate());
        Ok(Self {
            id,
            backend,
            master_gain: 1.0,
        })
    }

    pub const fn id(&self) -> DeviceId {
        self.id
    }

    pub fn backend(&self) -> &dyn AudioBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn AudioBackend {
        self.backend.as_mut()
    }

    /// Convert a fade length to device frames at the device's own rate
    pub fn frames(&self, ms: u32) -> u64 {
        ms_to_frames(ms, self.backend.sample_rate())
    }

    pub const fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn set_master_gain(&mut self, gain: f32) -> Result<(), ResourceError> {
        self.backend.set_master_gain(gain)?;
        self.master_gain = gain;
        Ok(())
    }
}

impl Drop for MixingDevice {
    fn drop(&mut self) {
        self.backend.shutdown();
        log::trace!("Closed audio device {:?}", self.id);
    }
}

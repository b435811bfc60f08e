//! Input device discovery and the backend seam
//!
//! The registry is built once at startup from whatever backend is in use
//! (cpal in the application, a scripted backend in tests) and is read-only
//! afterwards.

use thiserror::Error;

/// Errors that can occur while talking to the audio subsystem
#[derive(Error, Debug)]
pub enum AudioError {
    #[error(
        "Audio device enumeration is unavailable: {0}\n  \
         Check that an audio server (PipeWire, PulseAudio, ALSA, CoreAudio or WASAPI) is running \
         and that this build has access to it."
    )]
    EnumerationUnavailable(String),

    #[error("Unknown input device index: {0}")]
    UnknownDevice(usize),

    #[error("Failed to open input stream on device {device}: {reason}")]
    StreamOpen { device: usize, reason: String },

    #[error("Failed to start input stream: {0}")]
    StreamStart(String),

    #[error("Failed to stop input stream: {0}")]
    StreamStop(String),
}

/// An input-capable audio device, as seen at startup
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Position of the device in the backend's full device list
    pub index: usize,
    pub name: String,
    pub max_input_channels: u16,
}

/// Requested shape of a capture stream. Samples are always delivered as `f32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Receives interleaved `f32` frames on the audio thread
pub type ChunkCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// A running (or ready to run) capture stream
pub trait CaptureStream {
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop delivering callbacks. Must not return while a callback can still fire.
    fn stop(&mut self) -> Result<(), AudioError>;
}

/// Device enumeration and stream creation
pub trait AudioBackend {
    /// Every device the backend knows about, input-capable or not
    fn input_devices(&self) -> Result<Vec<Device>, AudioError>;

    fn open_input(
        &self,
        device: &Device,
        params: StreamParams,
        on_chunk: ChunkCallback,
    ) -> Result<Box<dyn CaptureStream>, AudioError>;
}

/// Input devices available to this process, queried once
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Enumerate devices and keep the ones with at least one input channel.
    ///
    /// Enumeration failure is fatal: the caller is expected to abort startup.
    pub fn query(backend: &dyn AudioBackend) -> Result<Self, AudioError> {
        let registry = Self {
            devices: backend
                .input_devices()?
                .into_iter()
                .filter(|d| d.max_input_channels > 0)
                .collect(),
        };

        if registry.is_empty() {
            log::warn!("No input devices found");
        } else {
            log::info!("Found {} input device(s)", registry.len());
        }
        for device in registry.iter() {
            log::debug!(
                "  [{}] {} ({} ch)",
                device.index,
                device.name,
                device.max_input_channels
            );
        }

        Ok(registry)
    }

    pub fn get(&self, index: usize) -> Option<&Device> {
        self.devices.iter().find(|d| d.index == index)
    }

    pub fn first(&self) -> Option<&Device> {
        self.devices.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

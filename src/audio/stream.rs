//! Shared, reference-counted capture streams
//!
//! Several consumers (node instances) may listen to the same device. The
//! first one to attach opens the device's stream; the last one to leave
//! stops it and clears the device history. All lifecycle calls happen on the
//! control thread. The only state that crosses into the audio thread is each
//! device's `ChunkBuffer`.

use std::collections::HashMap;

use super::buffer::ChunkBuffer;
use super::device::{
    AudioBackend, AudioError, CaptureStream, ChunkCallback, Device, DeviceRegistry, StreamParams,
};
use super::window::{self, FrameQuery, WindowResult};

/// Identity of one consumer of device streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

/// Per-device stream slot. Persists across uses with the stream cleared.
struct StreamHandle {
    /// `None` when closed, or when opening failed
    stream: Option<Box<dyn CaptureStream>>,
    ref_count: usize,
}

/// Owns every device stream, its history, and which consumer uses which device
pub struct StreamManager {
    backend: Box<dyn AudioBackend>,
    registry: DeviceRegistry,
    sample_rate: u32,
    retention: usize,
    streams: HashMap<usize, StreamHandle>,
    buffers: HashMap<usize, ChunkBuffer>,
    bindings: HashMap<ConsumerId, usize>,
    next_consumer: u64,
    revision: u64,
}

impl StreamManager {
    pub fn new(
        backend: Box<dyn AudioBackend>,
        registry: DeviceRegistry,
        sample_rate: u32,
        retention: usize,
    ) -> Self {
        Self {
            backend,
            registry,
            sample_rate,
            retention,
            streams: HashMap::new(),
            buffers: HashMap::new(),
            bindings: HashMap::new(),
            next_consumer: 0,
            revision: 0,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Hand out a fresh consumer identity
    pub fn register_consumer(&mut self) -> ConsumerId {
        let id = ConsumerId(self.next_consumer);
        self.next_consumer += 1;
        id
    }

    /// Bind `consumer` to `device_index`, releasing whatever it used before.
    ///
    /// A stream that cannot be opened is not an error: the consumer stays
    /// bound and its windows come back empty.
    pub fn attach(&mut self, consumer: ConsumerId, device_index: usize) -> Result<(), AudioError> {
        let device = self
            .registry
            .get(device_index)
            .cloned()
            .ok_or(AudioError::UnknownDevice(device_index))?;

        // The binding is kept until it is overwritten below.
        self.release_previous(consumer);

        log::info!("Switching to device {}: '{}'", device.index, device.name);

        let handle = self.streams.entry(device_index).or_insert(StreamHandle {
            stream: None,
            ref_count: 0,
        });

        if handle.ref_count == 0 {
            log::info!("Opening stream for device {}", device_index);
            let buffer = self
                .buffers
                .entry(device_index)
                .or_insert_with(|| ChunkBuffer::new(self.retention));
            let params = StreamParams {
                sample_rate: self.sample_rate,
                channels: device.max_input_channels,
            };
            let callback = buffer.capture_callback(device.max_input_channels);

            handle.stream = match open_and_start(&*self.backend, &device, params, callback) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    log::warn!("Could not open stream: {}", e);
                    None
                }
            };
        }

        handle.ref_count += 1;
        self.bindings.insert(consumer, device_index);
        self.revision += 1;
        Ok(())
    }

    /// Remove `consumer` for good, closing its device's stream if nobody else uses it
    pub fn detach(&mut self, consumer: ConsumerId) {
        self.release_previous(consumer);
        self.bindings.remove(&consumer);
    }

    /// Drop the consumer's reference on its current device without unbinding it
    fn release_previous(&mut self, consumer: ConsumerId) {
        let Some(&device_index) = self.bindings.get(&consumer) else {
            return;
        };
        let Some(handle) = self.streams.get_mut(&device_index) else {
            return;
        };

        handle.ref_count = handle.ref_count.saturating_sub(1);
        if handle.ref_count > 0 {
            return;
        }

        log::info!("Closing stream for the previous device ({})", device_index);
        if let Some(mut stream) = handle.stream.take() {
            if let Err(e) = stream.stop() {
                log::warn!("{}", e);
            }
        }
        if let Some(buffer) = self.buffers.get(&device_index) {
            buffer.clear();
        }
    }

    /// Window the device's current history for one rendered frame
    pub fn compute_window(&self, device_index: usize, query: &FrameQuery) -> WindowResult {
        let channels = self
            .registry
            .get(device_index)
            .map(|d| d.max_input_channels)
            .unwrap_or(0);
        let snapshot = self.buffers.get(&device_index).and_then(ChunkBuffer::snapshot);

        window::extract(snapshot.as_ref(), channels, query, self.sample_rate)
    }

    pub fn ref_count(&self, device_index: usize) -> usize {
        self.streams
            .get(&device_index)
            .map(|h| h.ref_count)
            .unwrap_or(0)
    }

    pub fn is_streaming(&self, device_index: usize) -> bool {
        self.streams
            .get(&device_index)
            .is_some_and(|h| h.stream.is_some())
    }

    pub fn bound_device(&self, consumer: ConsumerId) -> Option<usize> {
        self.bindings.get(&consumer).copied()
    }

    pub fn buffer(&self, device_index: usize) -> Option<&ChunkBuffer> {
        self.buffers.get(&device_index)
    }

    /// Bumped on every successful attach; hosts compare it to know when to redraw
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        for (device_index, handle) in self.streams.iter_mut() {
            if let Some(mut stream) = handle.stream.take() {
                log::debug!("Stopping stream for device {}", device_index);
                if let Err(e) = stream.stop() {
                    log::warn!("{}", e);
                }
            }
        }
    }
}

fn open_and_start(
    backend: &dyn AudioBackend,
    device: &Device,
    params: StreamParams,
    callback: ChunkCallback,
) -> Result<Box<dyn CaptureStream>, AudioError> {
    let mut stream = backend.open_input(device, params, callback)?;
    stream.start()?;
    Ok(stream)
}

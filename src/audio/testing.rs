//! Scripted audio backend for tests
//!
//! Stands in for real hardware: records every open/start/stop and lets a
//! test push chunks into the callback of a running stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::device::{AudioBackend, AudioError, CaptureStream, ChunkCallback, Device, StreamParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Open(usize),
    Start(usize),
    Stop(usize),
}

#[derive(Default)]
struct ScriptState {
    events: Vec<Event>,
    params: HashMap<usize, StreamParams>,
    running: HashMap<usize, ChunkCallback>,
}

/// Shared view of the backend's recorded state, kept by the test
#[derive(Clone)]
pub struct ScriptHandle(Arc<Mutex<ScriptState>>);

impl ScriptHandle {
    /// Deliver one interleaved chunk to the device's callback.
    /// Returns false when no stream is running on that device.
    pub fn feed(&self, device: usize, data: &[f32]) -> bool {
        let mut state = self.0.lock().unwrap();
        match state.running.get_mut(&device) {
            Some(callback) => {
                callback(data);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, device: usize) -> bool {
        self.0.lock().unwrap().running.contains_key(&device)
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().events.clone()
    }

    pub fn count(&self, event: Event) -> usize {
        self.events().iter().filter(|e| **e == event).count()
    }

    pub fn params(&self, device: usize) -> Option<StreamParams> {
        self.0.lock().unwrap().params.get(&device).copied()
    }
}

pub struct ScriptedBackend {
    devices: Option<Vec<Device>>,
    failing: Vec<usize>,
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    /// Devices are indexed in the given order: `(name, max_input_channels)`
    pub fn new(devices: &[(&str, u16)]) -> Self {
        let devices = devices
            .iter()
            .enumerate()
            .map(|(index, (name, channels))| Device {
                index,
                name: name.to_string(),
                max_input_channels: *channels,
            })
            .collect();

        Self {
            devices: Some(devices),
            failing: Vec::new(),
            state: Arc::new(Mutex::new(ScriptState::default())),
        }
    }

    /// A backend whose enumeration always fails
    pub fn unavailable() -> Self {
        Self {
            devices: None,
            failing: Vec::new(),
            state: Arc::new(Mutex::new(ScriptState::default())),
        }
    }

    /// Opening a stream on `device` will fail (busy hardware)
    pub fn failing_on(mut self, device: usize) -> Self {
        self.failing.push(device);
        self
    }

    pub fn handle(&self) -> ScriptHandle {
        ScriptHandle(Arc::clone(&self.state))
    }
}

impl AudioBackend for ScriptedBackend {
    fn input_devices(&self) -> Result<Vec<Device>, AudioError> {
        self.devices
            .clone()
            .ok_or_else(|| AudioError::EnumerationUnavailable("no audio host".to_string()))
    }

    fn open_input(
        &self,
        device: &Device,
        params: StreamParams,
        on_chunk: ChunkCallback,
    ) -> Result<Box<dyn CaptureStream>, AudioError> {
        if self.failing.contains(&device.index) {
            return Err(AudioError::StreamOpen {
                device: device.index,
                reason: "device busy".to_string(),
            });
        }

        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Open(device.index));
        state.params.insert(device.index, params);

        Ok(Box::new(ScriptedStream {
            device: device.index,
            pending: Some(on_chunk),
            state: Arc::clone(&self.state),
        }))
    }
}

struct ScriptedStream {
    device: usize,
    pending: Option<ChunkCallback>,
    state: Arc<Mutex<ScriptState>>,
}

impl CaptureStream for ScriptedStream {
    fn start(&mut self) -> Result<(), AudioError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Start(self.device));
        if let Some(callback) = self.pending.take() {
            state.running.insert(self.device, callback);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Stop(self.device));
        state.running.remove(&self.device);
        Ok(())
    }
}

//! Live sound input node
//!
//! Glue between a host's per-frame execution and the shared device streams:
//! holds the user-facing configuration, keeps the output layout in step
//! with it, and turns each frame's window into sound and wavepoint outputs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{AudioError, ConsumerId, DeviceRegistry, FrameQuery, StreamManager};
use crate::sound::{SequenceApi, SequenceParams, Sound, SoundData, SoundError, SoundSequence};

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("No audio input devices available")]
    NoInputDevices,

    #[error("Invalid audio device id: '{0}'")]
    InvalidDeviceId(String),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("Failed to build sound: {0}")]
    Sound(#[from] SoundError),
}

/// User-editable node properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Device index as a string; empty selects the first input device
    pub device_id: String,
    /// Applied to both outputs
    pub gain: f32,
    /// Shifts the sound's timestamps by whole frames. Does not affect the wavepoint.
    pub frame_offset: i32,
    /// Mix all channels down to one output pair
    pub mono: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            gain: 1.0,
            frame_offset: 0,
            mono: true,
        }
    }
}

/// `(id, label)` pairs for a device selector
pub fn device_choices(registry: &DeviceRegistry) -> Vec<(String, String)> {
    registry
        .iter()
        .map(|d| (d.index.to_string(), d.name.clone()))
        .collect()
}

fn resolve_device(registry: &DeviceRegistry, device_id: &str) -> Result<usize, NodeError> {
    if device_id.is_empty() {
        return registry
            .first()
            .map(|d| d.index)
            .ok_or(NodeError::NoInputDevices);
    }
    device_id
        .parse::<usize>()
        .ok()
        .filter(|&index| registry.get(index).is_some())
        .ok_or_else(|| NodeError::InvalidDeviceId(device_id.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Sound,
    Float,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSocket {
    pub kind: SocketKind,
    pub name: String,
    pub identifier: String,
}

/// Fixed output arity for one device/mono combination
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    sockets: Vec<OutputSocket>,
}

impl OutputLayout {
    pub fn new(mono: bool, device_channels: u16) -> Self {
        let sockets = if mono {
            vec![
                OutputSocket {
                    kind: SocketKind::Sound,
                    name: "Live sound channel".to_string(),
                    identifier: "sound".to_string(),
                },
                OutputSocket {
                    kind: SocketKind::Float,
                    name: "Wavepoints of channel".to_string(),
                    identifier: "sound_float".to_string(),
                },
            ]
        } else {
            (0..device_channels)
                .flat_map(|i| {
                    [
                        OutputSocket {
                            kind: SocketKind::Sound,
                            name: format!("Live sound channel {}", i),
                            identifier: format!("sound_{}", i),
                        },
                        OutputSocket {
                            kind: SocketKind::Float,
                            name: format!("Wavepoints of channel {}", i),
                            identifier: format!("sound_float_{}", i),
                        },
                    ]
                })
                .collect()
        };
        Self { sockets }
    }

    pub fn sockets(&self) -> &[OutputSocket] {
        &self.sockets
    }

    /// Number of (sound, wavepoint) pairs
    pub fn channel_count(&self) -> usize {
        self.sockets.len() / 2
    }
}

/// One output pair
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOutput {
    pub sound: Sound,
    pub wavepoint: f32,
}

/// One node instance bound to a device stream
pub struct LiveSoundNode {
    id: ConsumerId,
    config: NodeConfig,
    device_index: usize,
    layout: OutputLayout,
    sequence_api: SequenceApi,
}

impl LiveSoundNode {
    /// Create the node and attach it to its configured device
    pub fn create(
        manager: &mut StreamManager,
        mut config: NodeConfig,
        sequence_api: SequenceApi,
    ) -> Result<Self, NodeError> {
        let device_index = resolve_device(manager.registry(), &config.device_id)?;
        config.device_id = device_index.to_string();

        let id = manager.register_consumer();
        manager.attach(id, device_index)?;

        let mut node = Self {
            id,
            config,
            device_index,
            layout: OutputLayout::new(true, 0),
            sequence_api,
        };
        node.rebuild_outputs(manager);
        Ok(node)
    }

    fn rebuild_outputs(&mut self, manager: &StreamManager) {
        let channels = manager
            .registry()
            .get(self.device_index)
            .map(|d| d.max_input_channels)
            .unwrap_or(0);
        self.layout = OutputLayout::new(self.config.mono, channels);
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn device_index(&self) -> usize {
        self.device_index
    }

    pub fn outputs(&self) -> &OutputLayout {
        &self.layout
    }

    /// Switch to another device; the node keeps its old device on error
    pub fn set_device(&mut self, manager: &mut StreamManager, device_id: &str) -> Result<(), NodeError> {
        let device_index = resolve_device(manager.registry(), device_id)?;
        manager.attach(self.id, device_index)?;

        self.device_index = device_index;
        self.config.device_id = device_index.to_string();
        self.rebuild_outputs(manager);
        Ok(())
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.config.gain = gain;
    }

    pub fn set_frame_offset(&mut self, frame_offset: i32) {
        self.config.frame_offset = frame_offset;
    }

    /// Changing the mix mode recreates the outputs
    pub fn set_mono(&mut self, manager: &StreamManager, mono: bool) {
        if self.config.mono != mono {
            self.config.mono = mono;
            self.rebuild_outputs(manager);
        }
    }

    /// Produce this frame's outputs, one pair per output channel
    pub fn execute(
        &self,
        manager: &StreamManager,
        frame: f64,
        fps: f64,
    ) -> Result<Vec<ChannelOutput>, NodeError> {
        let query = FrameQuery {
            frame_number: frame,
            frame_offset: self.config.frame_offset,
            fps,
            gain: self.config.gain,
            mono: self.config.mono,
        };
        let window = manager.compute_window(self.device_index, &query);

        window
            .channels
            .into_iter()
            .take(self.layout.channel_count())
            .map(|channel| {
                if channel.samples.is_empty() {
                    return Ok(ChannelOutput {
                        sound: Sound::empty(),
                        wavepoint: 0.0,
                    });
                }

                let data = Arc::new(SoundData::new(channel.samples, manager.sample_rate()));
                let sequence = SoundSequence::with_fallback(
                    data,
                    SequenceParams {
                        start: window.start_s,
                        end: window.end_s,
                        volume: 1.0,
                        fps: window.fps,
                        start_offset: None,
                    },
                    self.sequence_api,
                )?;

                Ok(ChannelOutput {
                    sound: Sound::new(vec![sequence]),
                    wavepoint: channel.filtered,
                })
            })
            .collect()
    }

    /// Release the node's device stream
    pub fn delete(self, manager: &mut StreamManager) {
        manager.detach(self.id);
    }
}

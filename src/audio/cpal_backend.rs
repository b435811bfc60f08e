//! Audio input through cpal
//!
//! Device indices are positions in `host.devices()`, so an index stays
//! meaningful for as long as the hardware list does not change.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::device::{AudioBackend, AudioError, CaptureStream, ChunkCallback, Device, StreamParams};

/// The platform's default cpal host
pub struct CpalBackend {
    host: cpal::Host,
}

impl CpalBackend {
    pub fn new() -> Self {
        let host = cpal::default_host();
        log::info!("Using audio host: {:?}", host.id());
        Self { host }
    }

    fn device_at(&self, index: usize) -> Result<cpal::Device, AudioError> {
        self.host
            .devices()
            .map_err(|e| AudioError::EnumerationUnavailable(e.to_string()))?
            .nth(index)
            .ok_or(AudioError::UnknownDevice(index))
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Highest channel count any input configuration of the device offers
fn max_input_channels(device: &cpal::Device) -> u16 {
    device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0)
}

impl AudioBackend for CpalBackend {
    fn input_devices(&self) -> Result<Vec<Device>, AudioError> {
        let devices = self
            .host
            .devices()
            .map_err(|e| AudioError::EnumerationUnavailable(e.to_string()))?;

        Ok(devices
            .enumerate()
            .map(|(index, device)| Device {
                index,
                name: device.name().unwrap_or_else(|_| "Unknown".to_string()),
                max_input_channels: max_input_channels(&device),
            })
            .collect())
    }

    fn open_input(
        &self,
        device: &Device,
        params: StreamParams,
        mut on_chunk: ChunkCallback,
    ) -> Result<Box<dyn CaptureStream>, AudioError> {
        let open_err = |reason: String| AudioError::StreamOpen {
            device: device.index,
            reason,
        };

        let cpal_device = self.device_at(device.index)?;
        let sample_format = cpal_device
            .default_input_config()
            .map_err(|e| open_err(e.to_string()))?
            .sample_format();

        let config = cpal::StreamConfig {
            channels: params.channels,
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        log::info!(
            "Opening '{}' at {} Hz, {} channel(s), {:?}",
            device.name,
            params.sample_rate,
            params.channels,
            sample_format
        );

        let device_name = device.name.clone();
        let err_fn = move |err: cpal::StreamError| log::error!("Audio error on '{}': {}", device_name, err);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => cpal_device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| on_chunk(data),
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => {
                let mut scratch: Vec<f32> = Vec::new();
                cpal_device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        scratch.clear();
                        scratch.extend(data.iter().map(|&s| s as f32 / 32768.0));
                        on_chunk(&scratch);
                    },
                    err_fn,
                    None,
                )
            }
            format => return Err(open_err(format!("unsupported sample format {:?}", format))),
        }
        .map_err(|e| open_err(e.to_string()))?;

        Ok(Box::new(CpalStream {
            stream: Some(stream),
        }))
    }
}

/// Owns a cpal input stream; dropping the stream ends its callbacks
struct CpalStream {
    stream: Option<cpal::Stream>,
}

impl CaptureStream for CpalStream {
    fn start(&mut self) -> Result<(), AudioError> {
        match &self.stream {
            Some(stream) => stream
                .play()
                .map_err(|e| AudioError::StreamStart(e.to_string())),
            None => Err(AudioError::StreamStart("stream already closed".to_string())),
        }
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        let paused = stream
            .pause()
            .map_err(|e| AudioError::StreamStop(e.to_string()));
        drop(stream);
        paused
    }
}

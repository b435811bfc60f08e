//! Audio module - live input capture and per-frame windowing
//!
//! This module provides:
//! - Device discovery and the backend seam (cpal in the app)
//! - Chunk history shared with the capture callbacks
//! - Reference-counted device streams
//! - Frame windows derived from the history

mod buffer;
mod cpal_backend;
mod device;
mod stream;
mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::MIN_WAVEPOINT_HISTORY;
pub use cpal_backend::CpalBackend;
pub use device::{AudioError, DeviceRegistry};
pub use stream::{ConsumerId, StreamManager};
pub use window::FrameQuery;

/// Fixed capture rate, matching the host's sound sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

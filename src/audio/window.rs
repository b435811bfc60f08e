//! Per-frame windowing of the captured history
//!
//! Turns a chronological snapshot of a device's history into one window per
//! output channel, aligned so the window ends at the frame's timestamp (plus
//! the configured frame offset). Each window also carries a single
//! "wavepoint": the mean of the trailing two-frame-periods of samples, a
//! rectangular filter with its first null at the frame rate, which keeps
//! sample-and-hold aliasing out of per-frame float animation.

use super::buffer::Snapshot;

/// What the host asks for on one rendered frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameQuery {
    pub frame_number: f64,
    pub frame_offset: i32,
    /// Frames per second. Must be non-zero; hosts always supply it.
    pub fps: f64,
    pub gain: f32,
    pub mono: bool,
}

impl FrameQuery {
    /// End of the window in seconds: `(frame + offset) / fps`
    pub fn end_time(&self) -> f64 {
        (self.frame_number + self.frame_offset as f64) / self.fps
    }

    /// Number of trailing samples averaged into the wavepoint
    pub fn filter_len(&self, sample_rate: u32) -> usize {
        (2.0 * sample_rate as f64 / self.fps).round() as usize
    }
}

/// Samples for one output channel, already scaled by gain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelWindow {
    pub samples: Vec<f32>,
    pub filtered: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowResult {
    /// One entry per output channel, in output order
    pub channels: Vec<ChannelWindow>,
    pub start_s: f64,
    pub end_s: f64,
    pub fps: f64,
}

impl WindowResult {
    /// No history: empty channels with a zero wavepoint
    pub fn empty(outputs: usize, query: &FrameQuery) -> Self {
        let end_s = query.end_time();
        Self {
            channels: vec![ChannelWindow::default(); outputs],
            start_s: end_s,
            end_s,
            fps: query.fps,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(|c| c.samples.is_empty())
    }
}

/// Output channel count for a device: one when mixing down, else one per input
pub fn output_channels(mono: bool, device_channels: u16) -> usize {
    if mono {
        1
    } else {
        device_channels as usize
    }
}

/// Build the frame's window from a snapshot of the device history
pub fn extract(
    snapshot: Option<&Snapshot>,
    device_channels: u16,
    query: &FrameQuery,
    sample_rate: u32,
) -> WindowResult {
    let outputs = output_channels(query.mono, device_channels);

    let snapshot = match snapshot {
        Some(s) if s.frames() > 0 => s,
        _ => return WindowResult::empty(outputs, query),
    };

    let nsamples = snapshot.frames();
    let end_s = query.end_time();
    let start_s = end_s - nsamples as f64 / sample_rate as f64;
    let filter_len = query.filter_len(sample_rate);

    let channels = (0..outputs)
        .map(|channel| {
            let samples = if query.mono {
                mix_down(snapshot, query.gain)
            } else {
                column(snapshot, channel, query.gain)
            };
            let filtered = trailing_mean(&samples, filter_len);
            ChannelWindow { samples, filtered }
        })
        .collect();

    WindowResult {
        channels,
        start_s,
        end_s,
        fps: query.fps,
    }
}

/// Average all channels of each frame, then apply gain
fn mix_down(snapshot: &Snapshot, gain: f32) -> Vec<f32> {
    let channels = snapshot.channels.max(1) as usize;
    snapshot
        .samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32 * gain)
        .collect()
}

/// One channel's samples with gain applied. Empty if the snapshot lacks it.
fn column(snapshot: &Snapshot, channel: usize, gain: f32) -> Vec<f32> {
    let channels = snapshot.channels.max(1) as usize;
    if channel >= channels {
        return Vec::new();
    }
    snapshot
        .samples
        .chunks_exact(channels)
        .map(|frame| frame[channel] * gain)
        .collect()
}

/// Mean of the last `len` samples, or of all of them if there are fewer
pub fn trailing_mean(samples: &[f32], len: usize) -> f32 {
    let n = len.min(samples.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = samples[samples.len() - n..].iter().map(|&s| s as f64).sum();
    (sum / n as f64) as f32
}

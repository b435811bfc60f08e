//! Playable sound container handed to the animation host
//!
//! A `Sound` is a list of sequences; each sequence places a block of raw
//! samples on the host timeline between `start` and `end` seconds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SoundError {
    #[error("Sequence constructor does not accept '{0}'")]
    UnexpectedArgument(&'static str),

    #[error("Invalid sequence range: start {start}s, end {end}s at {fps} fps")]
    InvalidRange { start: f64, end: f64, fps: f64 },
}

/// Which sequence constructor the host exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceApi {
    /// Accepts a start offset into the clip
    #[default]
    Current,
    /// Older hosts: no start offset argument
    Legacy,
}

/// Raw mono samples at a fixed rate
#[derive(Debug, Clone, PartialEq)]
pub struct SoundData {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl SoundData {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Constructor arguments for a sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceParams {
    pub start: f64,
    pub end: f64,
    pub volume: f32,
    pub fps: f64,
    pub start_offset: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SoundSequence {
    data: Arc<SoundData>,
    start: f64,
    end: f64,
    volume: f32,
    fps: f64,
    start_offset: f64,
}

impl SoundSequence {
    /// Construct through the host's constructor signature
    pub fn new(
        data: Arc<SoundData>,
        params: SequenceParams,
        api: SequenceApi,
    ) -> Result<Self, SoundError> {
        if api == SequenceApi::Legacy && params.start_offset.is_some() {
            return Err(SoundError::UnexpectedArgument("start_offset"));
        }
        if params.end < params.start || params.fps <= 0.0 {
            return Err(SoundError::InvalidRange {
                start: params.start,
                end: params.end,
                fps: params.fps,
            });
        }

        Ok(Self {
            data,
            start: params.start,
            end: params.end,
            volume: params.volume,
            fps: params.fps,
            start_offset: params.start_offset.unwrap_or(0.0),
        })
    }

    /// Build with a zero start offset, retrying without it on hosts that
    /// reject the argument. Any other error is returned as is.
    pub fn with_fallback(
        data: Arc<SoundData>,
        params: SequenceParams,
        api: SequenceApi,
    ) -> Result<Self, SoundError> {
        let richer = SequenceParams {
            start_offset: Some(0.0),
            ..params
        };
        match Self::new(Arc::clone(&data), richer, api) {
            Err(SoundError::UnexpectedArgument(arg)) => {
                log::debug!("Host rejected '{}', using reduced constructor", arg);
                Self::new(
                    data,
                    SequenceParams {
                        start_offset: None,
                        ..params
                    },
                    api,
                )
            }
            other => other,
        }
    }

    pub fn data(&self) -> &SoundData {
        &self.data
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn start_offset(&self) -> f64 {
        self.start_offset
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sound {
    sequences: Vec<SoundSequence>,
}

impl Sound {
    pub fn new(sequences: Vec<SoundSequence>) -> Self {
        Self { sequences }
    }

    /// A sound with no sequences
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn sequences(&self) -> &[SoundSequence] {
        &self.sequences
    }

    /// Samples of every sequence, in sequence order
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.sequences
            .iter()
            .flat_map(|s| s.data().samples().iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> Arc<SoundData> {
        Arc::new(SoundData::new(vec![0.0, 0.5, -0.5], 44_100))
    }

    fn params() -> SequenceParams {
        SequenceParams {
            start: 1.0,
            end: 2.0,
            volume: 1.0,
            fps: 24.0,
            start_offset: None,
        }
    }

    #[test]
    fn test_current_api_keeps_offset() {
        let seq = SoundSequence::with_fallback(data(), params(), SequenceApi::Current).unwrap();
        assert_eq!(seq.start_offset(), 0.0);
        assert_eq!(seq.start(), 1.0);
        assert_eq!(seq.end(), 2.0);
    }

    #[test]
    fn test_legacy_api_rejects_offset() {
        let richer = SequenceParams {
            start_offset: Some(0.0),
            ..params()
        };
        let err = SoundSequence::new(data(), richer, SequenceApi::Legacy).unwrap_err();
        assert_eq!(err, SoundError::UnexpectedArgument("start_offset"));
    }

    #[test]
    fn test_fallback_on_legacy_api() {
        let seq = SoundSequence::with_fallback(data(), params(), SequenceApi::Legacy).unwrap();
        assert_eq!(seq.data().samples(), &[0.0, 0.5, -0.5]);
        assert_eq!(seq.fps(), 24.0);
    }

    #[test]
    fn test_fallback_does_not_hide_other_errors() {
        let bad = SequenceParams {
            start: 3.0,
            ..params()
        };
        let err = SoundSequence::with_fallback(data(), bad, SequenceApi::Legacy).unwrap_err();
        assert!(matches!(err, SoundError::InvalidRange { .. }));
    }

    #[test]
    fn test_sound_samples() {
        let seq = SoundSequence::new(data(), params(), SequenceApi::Current).unwrap();
        let sound = Sound::new(vec![seq]);
        assert!(!sound.is_empty());
        assert_eq!(sound.samples().collect::<Vec<_>>(), vec![0.0, 0.5, -0.5]);
        assert!(Sound::empty().is_empty());
    }
}

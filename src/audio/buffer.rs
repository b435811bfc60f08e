//! Chunk history shared between a capture callback and the frame renderer
//!
//! Each device with an open stream owns one `ChunkBuffer`. The capture
//! callback is the only writer: it prepends every delivered chunk and trims
//! the history back down to the retention threshold. The control thread only
//! reads, concatenating the retained chunks once per rendered frame.
//!
//! ## Retention
//!
//! Trimming works on whole chunks. After a push the buffer keeps the
//! shortest newest-first run of chunks whose frame count reaches the
//! threshold, so it may hold up to one chunk's worth of frames more than
//! strictly needed. The windowing code tolerates that.
//!
//! ## Locking
//!
//! The chunk list sits behind a `Mutex` that is held only for the
//! prepend/trim and for the concatenation in `snapshot()`. Nothing else
//! happens under the lock.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use super::device::ChunkCallback;

/// Minimum number of frames kept per device.
///
/// A 24 fps render at 44.1 kHz consumes ~1838 frames per frame, so this
/// holds well over ten frames of history for spectrum-style consumers.
pub const MIN_WAVEPOINT_HISTORY: usize = 1 << 15;

/// One callback-delivered block of interleaved samples
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    samples: Vec<f32>,
    channels: u16,
}

impl Chunk {
    /// Copy interleaved data, dropping a trailing partial frame if present
    pub fn from_interleaved(data: &[f32], channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = data.len() - data.len() % channels as usize;
        Self {
            samples: data[..whole].to_vec(),
            channels,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Chronologically ordered copy of everything currently retained
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    /// Interleaved, oldest frame first
    pub samples: Vec<f32>,
    pub channels: u16,
}

impl Snapshot {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Thread-safe, chunk-granular bounded history
///
/// Cloning shares the same underlying history, which is how the capture
/// callback and the stream manager both hold it.
pub struct ChunkBuffer {
    /// Newest chunk first
    chunks: Arc<Mutex<VecDeque<Chunk>>>,
    /// Total frames ever pushed (for statistics)
    frames_written: Arc<AtomicU64>,
    /// Minimum frames to keep
    retention: usize,
}

impl ChunkBuffer {
    /// Create an empty buffer that keeps at least `retention` frames
    pub fn new(retention: usize) -> Self {
        Self {
            chunks: Arc::new(Mutex::new(VecDeque::new())),
            frames_written: Arc::new(AtomicU64::new(0)),
            retention,
        }
    }

    // A panic on another thread must not take the audio callback down with it.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Chunk>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prepend a chunk and trim the history
    pub fn push(&self, chunk: Chunk) {
        let frames = chunk.frames() as u64;
        {
            let mut chunks = self.lock();
            chunks.push_front(chunk);
            trim(&mut chunks, self.retention);
        }
        self.frames_written.fetch_add(frames, Ordering::Relaxed);
    }

    /// Build the callback handed to a capture stream with `channels` channels
    pub fn capture_callback(&self, channels: u16) -> ChunkCallback {
        let buffer = self.clone_ref();
        Box::new(move |data: &[f32]| {
            if data.is_empty() {
                return;
            }
            buffer.push(Chunk::from_interleaved(data, channels));
        })
    }

    /// Concatenate the retained chunks, oldest first.
    ///
    /// Returns `None` when nothing has been captured.
    pub fn snapshot(&self) -> Option<Snapshot> {
        let chunks = self.lock();
        let channels = chunks.front()?.channels();

        let total: usize = chunks.iter().map(|c| c.samples().len()).sum();
        let mut samples = Vec::with_capacity(total);
        for chunk in chunks.iter().rev().filter(|c| c.channels() == channels) {
            samples.extend_from_slice(chunk.samples());
        }

        Some(Snapshot { samples, channels })
    }

    /// Drop all retained chunks
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn retained_frames(&self) -> usize {
        self.lock().iter().map(Chunk::frames).sum()
    }

    pub fn chunk_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Get total frames ever pushed
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    /// Clone reference to share between threads
    pub fn clone_ref(&self) -> Self {
        Self {
            chunks: Arc::clone(&self.chunks),
            frames_written: Arc::clone(&self.frames_written),
            retention: self.retention,
        }
    }
}

impl Clone for ChunkBuffer {
    fn clone(&self) -> Self {
        self.clone_ref()
    }
}

/// Keep the newest chunks up to and including the one where the running
/// frame count reaches `retention`.
fn trim(chunks: &mut VecDeque<Chunk>, retention: usize) {
    let mut running = 0;
    let keep = chunks.iter().position(|chunk| {
        running += chunk.frames();
        running >= retention
    });
    if let Some(last) = keep {
        chunks.truncate(last + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(values: &[f32]) -> Chunk {
        Chunk::from_interleaved(values, 1)
    }

    fn ramp(start: usize, len: usize) -> Chunk {
        let values: Vec<f32> = (start..start + len).map(|v| v as f32).collect();
        mono(&values)
    }

    #[test]
    fn test_chunk_drops_partial_frame() {
        let chunk = Chunk::from_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0], 2);
        assert_eq!(chunk.frames(), 2);
        assert_eq!(chunk.samples(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_keeps_everything_below_threshold() {
        let buffer = ChunkBuffer::new(100);
        buffer.push(ramp(0, 30));
        buffer.push(ramp(30, 30));
        buffer.push(ramp(60, 30));

        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(buffer.retained_frames(), 90);
    }

    #[test]
    fn test_trims_to_minimal_prefix() {
        let buffer = ChunkBuffer::new(100);
        for i in 0..10 {
            buffer.push(ramp(i * 30, 30));
        }

        // 4 * 30 = 120 is the first running total >= 100
        assert_eq!(buffer.chunk_count(), 4);
        assert_eq!(buffer.retained_frames(), 120);
        assert_eq!(buffer.frames_written(), 300);
    }

    #[test]
    fn test_exact_threshold_keeps_no_extra_chunk() {
        let buffer = ChunkBuffer::new(100);
        for i in 0..6 {
            buffer.push(ramp(i * 25, 25));
        }
        assert_eq!(buffer.chunk_count(), 4);
        assert_eq!(buffer.retained_frames(), 100);
    }

    #[test]
    fn test_large_chunk_is_retained_whole() {
        let buffer = ChunkBuffer::new(100);
        buffer.push(ramp(0, 10));
        buffer.push(ramp(10, 500));

        assert_eq!(buffer.chunk_count(), 1);
        assert_eq!(buffer.retained_frames(), 500);
    }

    #[test]
    fn test_retention_invariant_with_uneven_chunks() {
        let retention = 1000;
        let buffer = ChunkBuffer::new(retention);
        let sizes = [17, 256, 3, 512, 64, 999, 1, 128, 700, 45, 300, 2048, 5, 90];
        let mut appended = 0;

        for (i, &size) in sizes.iter().cycle().take(60).enumerate() {
            buffer.push(ramp(i, size));
            appended += size;

            let retained = buffer.retained_frames();
            if appended >= retention {
                assert!(retained >= retention);

                // Dropping the oldest retained chunk must fall below the threshold
                let chunks = buffer.lock();
                let without_oldest: usize =
                    chunks.iter().take(chunks.len() - 1).map(Chunk::frames).sum();
                assert!(without_oldest < retention);
            } else {
                assert_eq!(retained, appended);
            }
        }
    }

    #[test]
    fn test_snapshot_is_chronological() {
        let buffer = ChunkBuffer::new(7);
        buffer.push(mono(&[1.0, 2.0]));
        buffer.push(mono(&[3.0, 4.0, 5.0]));
        buffer.push(mono(&[6.0]));
        buffer.push(mono(&[7.0, 8.0]));
        buffer.push(mono(&[9.0, 10.0, 11.0]));

        // Newest first: [9..11], [7,8], [6], [3..5] -> 3 + 2 + 1 + 3 = 9 >= 7
        let snapshot = buffer.snapshot().unwrap();
        assert_eq!(
            snapshot.samples,
            vec![3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0]
        );
        assert_eq!(snapshot.frames(), 9);
    }

    #[test]
    fn test_snapshot_keeps_interleaving() {
        let buffer = ChunkBuffer::new(16);
        buffer.push(Chunk::from_interleaved(&[0.1, -0.1, 0.2, -0.2], 2));
        buffer.push(Chunk::from_interleaved(&[0.3, -0.3], 2));

        let snapshot = buffer.snapshot().unwrap();
        assert_eq!(snapshot.channels, 2);
        assert_eq!(snapshot.frames(), 3);
        assert_eq!(snapshot.samples, vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
    }

    #[test]
    fn test_empty_snapshot_and_clear() {
        let buffer = ChunkBuffer::new(16);
        assert!(buffer.snapshot().is_none());

        buffer.push(ramp(0, 4));
        assert!(!buffer.is_empty());

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.snapshot().is_none());
    }

    #[test]
    fn test_callback_feeds_shared_history() {
        let buffer = ChunkBuffer::new(64);
        let mut callback = buffer.capture_callback(2);

        callback(&[0.5, 0.25, 0.5, 0.25]);
        callback(&[]);

        assert_eq!(buffer.chunk_count(), 1);
        assert_eq!(buffer.retained_frames(), 2);
    }

    #[test]
    fn test_callback_from_another_thread() {
        let buffer = ChunkBuffer::new(1 << 12);
        let mut callback = buffer.capture_callback(1);

        let handle = std::thread::spawn(move || {
            for _ in 0..100 {
                callback(&[0.0; 64]);
            }
        });
        handle.join().unwrap();

        assert_eq!(buffer.frames_written(), 6400);
        assert_eq!(buffer.retained_frames(), 1 << 12);
    }
}

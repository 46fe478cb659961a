//! Session audio accumulation.
//!
//! Capture callbacks append [`AudioChunk`]s to an [`AudioBuffer`] in arrival
//! order. The first chunk establishes the session sample rate; every later
//! chunk must match it, and a mismatch is a hard error rather than a silent
//! per-chunk resample.
//!
//! The buffer is NOT internally synchronized. Capture runs on a thread owned
//! by the audio backend, so callers share it through [`SharedAudioBuffer`],
//! which wraps the buffer in an `Arc<Mutex<_>>`.

use std::sync::{Arc, Mutex};

/// Errors that can occur when appending to an [`AudioBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Chunk sample rate differs from the rate established by the first chunk.
    FormatMismatch { expected: u32, got: u32 },
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::FormatMismatch { expected, got } => write!(
                f,
                "Chunk sample rate {} Hz does not match session rate {} Hz",
                got, expected
            ),
        }
    }
}

impl std::error::Error for BufferError {}

/// One capture callback's worth of mono PCM16 samples.
///
/// Chunks are immutable once appended; the accumulator owns them.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of this chunk in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / self.sample_rate as u64
    }
}

/// Ordered chunk sequence for one recording session.
///
/// Concatenation preserves sample ordering exactly: no reordering, no
/// deduplication, no interleaving.
#[derive(Debug, Clone, Default)]
pub struct AudioBuffer {
    chunks: Vec<AudioChunk>,
    sample_rate: Option<u32>,
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk in arrival order.
    ///
    /// The first chunk establishes the session sample rate. A chunk with a
    /// different rate fails with [`BufferError::FormatMismatch`] and leaves
    /// the buffer unchanged.
    pub fn append(&mut self, chunk: AudioChunk) -> Result<(), BufferError> {
        match self.sample_rate {
            Some(expected) if expected != chunk.sample_rate() => {
                return Err(BufferError::FormatMismatch {
                    expected,
                    got: chunk.sample_rate(),
                });
            }
            Some(_) => {}
            None => self.sample_rate = Some(chunk.sample_rate()),
        }
        self.chunks.push(chunk);
        Ok(())
    }

    /// Sample rate established by the first appended chunk, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Total number of samples across all chunks.
    pub fn sample_count(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }

    /// True when no samples have been accumulated.
    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    /// Total duration of buffered audio in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        match self.sample_rate {
            Some(rate) if rate > 0 => (self.sample_count() as u64 * 1000) / rate as u64,
            _ => 0,
        }
    }

    /// Concatenate all chunks into one sample array, in arrival order.
    pub fn concat(&self) -> Vec<i16> {
        let mut out = Vec::with_capacity(self.sample_count());
        for chunk in &self.chunks {
            out.extend_from_slice(chunk.samples());
        }
        out
    }

    /// Discard all chunks and the established sample rate.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.sample_rate = None;
    }
}

/// Mutex-guarded buffer shared between the capture callback thread and the
/// interaction thread that requests finalization.
#[derive(Debug, Clone, Default)]
pub struct SharedAudioBuffer {
    inner: Arc<Mutex<AudioBuffer>>,
}

impl SharedAudioBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk under the lock. Safe to call from the capture thread.
    pub fn append(&self, chunk: AudioChunk) -> Result<(), BufferError> {
        self.inner.lock().unwrap().append(chunk)
    }

    /// Clone the current buffer contents under the lock.
    pub fn snapshot(&self) -> AudioBuffer {
        self.inner.lock().unwrap().clone()
    }

    /// Take the buffer contents, leaving an empty buffer behind.
    pub fn take(&self) -> AudioBuffer {
        std::mem::take(&mut *self.inner.lock().unwrap())
    }

    /// Reset to an empty buffer with no established sample rate.
    pub fn reset(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        self.inner.lock().unwrap().duration_ms()
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.inner.lock().unwrap().sample_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_arrival_order() {
        let mut buffer = AudioBuffer::new();
        buffer.append(AudioChunk::new(vec![1, 2], 16000)).unwrap();
        buffer.append(AudioChunk::new(vec![3, 4], 16000)).unwrap();
        buffer.append(AudioChunk::new(vec![5], 16000)).unwrap();

        assert_eq!(buffer.concat(), vec![1, 2, 3, 4, 5]);
        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(buffer.sample_count(), 5);
    }

    #[test]
    fn test_first_chunk_establishes_rate() {
        let mut buffer = AudioBuffer::new();
        assert_eq!(buffer.sample_rate(), None);

        buffer.append(AudioChunk::new(vec![0; 100], 48000)).unwrap();
        assert_eq!(buffer.sample_rate(), Some(48000));
    }

    #[test]
    fn test_rate_mismatch_leaves_buffer_unchanged() {
        let mut buffer = AudioBuffer::new();
        buffer.append(AudioChunk::new(vec![1, 2, 3], 16000)).unwrap();

        let err = buffer
            .append(AudioChunk::new(vec![4, 5], 44100))
            .unwrap_err();
        assert_eq!(
            err,
            BufferError::FormatMismatch {
                expected: 16000,
                got: 44100
            }
        );

        // Failed append must not grow the buffer or change its format.
        assert_eq!(buffer.concat(), vec![1, 2, 3]);
        assert_eq!(buffer.sample_rate(), Some(16000));
    }

    #[test]
    fn test_duration_ms() {
        let mut buffer = AudioBuffer::new();
        buffer
            .append(AudioChunk::new(vec![0; 1600], 16000))
            .unwrap();
        assert_eq!(buffer.duration_ms(), 100);

        buffer
            .append(AudioChunk::new(vec![0; 1600], 16000))
            .unwrap();
        assert_eq!(buffer.duration_ms(), 200);
    }

    #[test]
    fn test_clear_resets_format() {
        let mut buffer = AudioBuffer::new();
        buffer.append(AudioChunk::new(vec![1], 16000)).unwrap();
        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.sample_rate(), None);

        // A new session may establish a different rate.
        buffer.append(AudioChunk::new(vec![1], 48000)).unwrap();
        assert_eq!(buffer.sample_rate(), Some(48000));
    }

    #[test]
    fn test_shared_buffer_interleaved_append_and_snapshot() {
        let shared = SharedAudioBuffer::new();
        let writer = shared.clone();

        let handle = std::thread::spawn(move || {
            for i in 0..10i16 {
                writer
                    .append(AudioChunk::new(vec![i; 160], 16000))
                    .unwrap();
            }
        });

        // Snapshots taken while the writer runs must always see a prefix of
        // the arrival order.
        let _ = shared.snapshot();
        handle.join().unwrap();

        let finished = shared.snapshot();
        assert_eq!(finished.chunk_count(), 10);
        let samples = finished.concat();
        assert_eq!(samples[0], 0);
        assert_eq!(samples[9 * 160], 9);
    }

    #[test]
    fn test_shared_buffer_take_leaves_empty() {
        let shared = SharedAudioBuffer::new();
        shared.append(AudioChunk::new(vec![1, 2], 16000)).unwrap();

        let taken = shared.take();
        assert_eq!(taken.sample_count(), 2);
        assert!(shared.is_empty());
        assert_eq!(shared.sample_rate(), None);
    }
}

//! Audio capture and normalization.
//!
//! Turns whatever source is active (microphone frames or an uploaded blob)
//! into one canonical mono PCM16 WAV temp file, with deterministic cleanup.

pub mod buffer;
pub mod capture;
pub mod decode;
pub mod scoped;
pub mod vad;
pub mod wav;

pub use buffer::{AudioBuffer, AudioChunk, BufferError, SharedAudioBuffer};
pub use capture::{CaptureError, CaptureHandle, MicCapture};
pub use scoped::{cleanup_stale_files, with_scoped_audio_file, ScopedWavFile};
pub use wav::{downsample, finalize_buffer_to_wav, finalize_upload_to_wav, FinalizeError};

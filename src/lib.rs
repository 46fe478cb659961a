//! voicepipe: audio capture and normalization for speech-to-text.
//!
//! Turns a live microphone session or an uploaded audio blob into one
//! canonical mono PCM16 WAV temp file, hands it to the hosted recognizer,
//! and optionally runs the transcript through an LLM cleanup pass.
//!
//! # Pipeline
//!
//! ```text
//! Mic frames ──▶ SharedAudioBuffer ──┐
//!                                    ├─▶ ScopedWavFile ──▶ transcribe ──▶ text ──▶ enhance
//! Upload blob ──▶ decode/re-encode ──┘        │
//!                                             └─ removed on every exit path
//! ```
//!
//! The temp file is owned by exactly one request and removed exactly once,
//! whether transcription succeeds, fails, or the request unwinds.

pub mod audio;
pub mod enhancement;
pub mod pipeline;
pub mod session;
pub mod settings;
pub mod transcription;

pub use audio::buffer::{AudioBuffer, AudioChunk, BufferError, SharedAudioBuffer};
pub use audio::capture::{CaptureError, CaptureHandle, MicCapture};
pub use audio::scoped::{cleanup_stale_files, with_scoped_audio_file, ScopedWavFile};
pub use audio::wav::{finalize_buffer_to_wav, finalize_upload_to_wav, FinalizeError};
pub use enhancement::{enhance, EnhancementError};
pub use pipeline::{
    enhance_transcript, transcribe_buffer, transcribe_upload, NoSpeechSource, PipelineError,
};
pub use session::{RecordingSession, SessionError, SessionState};
pub use settings::{load_settings, save_settings, PipelineSettings};
pub use transcription::{transcribe, TranscriptionError, TranscriptionResult};

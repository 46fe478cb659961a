//! Speech-to-text transcription via the Whisper API.

mod whisper;

pub use whisper::{
    api_key, is_api_key_configured, transcribe, TranscriptionError, TranscriptionResult,
};

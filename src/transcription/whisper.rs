//! Whisper API client for speech-to-text transcription.
//!
//! Sends a canonical WAV file to the hosted Whisper endpoint and maps the
//! response into either text or a typed failure. The file is treated as
//! read-only; deleting it afterwards is the caller's job under the
//! scoped-file contract.

use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

const WHISPER_API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const WHISPER_MODEL: &str = "whisper-1";
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Above this no-speech probability, a near-empty transcript is reported as
/// no speech rather than as a (hallucinated) transcription.
const NO_SPEECH_PROB_THRESHOLD: f32 = 0.8;
const NO_SPEECH_MAX_TEXT_LEN: usize = 12;

/// Shared HTTP client, reused across requests to avoid TLS handshake
/// overhead.
static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .expect("Failed to build HTTP client")
});

/// Load a `.env` file once before the first credential lookup (development
/// convenience; production sets real environment variables).
static DOTENV: Lazy<()> = Lazy::new(|| {
    if dotenvy::dotenv().is_ok() {
        log::debug!("Loaded .env file");
    }
});

/// Errors that can occur during transcription.
#[derive(Debug)]
pub enum TranscriptionError {
    /// API key not configured.
    MissingApiKey,
    /// Failed to read the audio file.
    FileRead(String),
    /// Network failure, service error, or unparseable response.
    RecognitionFailure { cause: String },
    /// The recognizer reported empty or unintelligible audio.
    NoSpeechDetected,
}

impl std::fmt::Display for TranscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptionError::MissingApiKey => {
                write!(
                    f,
                    "API key not configured. Set OPENAI_API_KEY environment variable."
                )
            }
            TranscriptionError::FileRead(e) => write!(f, "Failed to read audio file: {}", e),
            TranscriptionError::RecognitionFailure { cause } => {
                write!(f, "Recognition failed: {}", cause)
            }
            TranscriptionError::NoSpeechDetected => write!(f, "No speech detected"),
        }
    }
}

impl std::error::Error for TranscriptionError {}

/// Transcript text plus the recognizer's no-speech estimate.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    pub text: String,
    pub no_speech_prob: Option<f32>,
}

/// Whisper verbose response.
#[derive(Debug, Deserialize)]
struct WhisperVerboseResponse {
    text: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    no_speech_prob: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Get the API key from the environment (after a one-time `.env` load).
pub fn api_key() -> Option<String> {
    Lazy::force(&DOTENV);
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|key| !key.is_empty())
}

/// Check whether an API key is configured (for status display).
pub fn is_api_key_configured() -> bool {
    api_key().is_some()
}

fn max_no_speech_prob(segments: &[WhisperSegment]) -> Option<f32> {
    segments
        .iter()
        .filter_map(|s| s.no_speech_prob)
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

/// Decide whether a successful response actually contained speech.
fn is_no_speech(text: &str, no_speech_prob: Option<f32>) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }
    match no_speech_prob {
        Some(prob) => prob >= NO_SPEECH_PROB_THRESHOLD && trimmed.len() <= NO_SPEECH_MAX_TEXT_LEN,
        None => false,
    }
}

/// Transcribe a canonical WAV file.
///
/// Returns the transcript on success, [`TranscriptionError::NoSpeechDetected`]
/// when the recognizer reports empty or unintelligible audio, and
/// [`TranscriptionError::RecognitionFailure`] for network or service errors.
pub async fn transcribe(wav_path: &Path) -> Result<TranscriptionResult, TranscriptionError> {
    let api_key = api_key().ok_or(TranscriptionError::MissingApiKey)?;

    let file_bytes = tokio::fs::read(wav_path)
        .await
        .map_err(|e| TranscriptionError::FileRead(e.to_string()))?;

    let filename = wav_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("audio.wav")
        .to_string();

    log::info!(
        "Transcribing audio file: {} ({} bytes)",
        filename,
        file_bytes.len()
    );

    let file_part = Part::bytes(file_bytes)
        .file_name(filename)
        .mime_str("audio/wav")
        .map_err(|e| TranscriptionError::RecognitionFailure {
            cause: e.to_string(),
        })?;

    let form = Form::new()
        .part("file", file_part)
        .text("model", WHISPER_MODEL)
        .text("response_format", "verbose_json")
        .text("temperature", "0");

    let response = HTTP_CLIENT
        .post(WHISPER_API_URL)
        .header("Authorization", format!("Bearer {}", api_key))
        .multipart(form)
        .send()
        .await
        .map_err(|e| TranscriptionError::RecognitionFailure {
            cause: e.to_string(),
        })?;

    let status = response.status();

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        let message =
            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                error_response.error.message
            } else {
                error_text
            };

        log::error!("Recognition API error ({}): {}", status.as_u16(), message);

        return Err(TranscriptionError::RecognitionFailure {
            cause: format!("{}: {}", status.as_u16(), message),
        });
    }

    let whisper_response: WhisperVerboseResponse =
        response
            .json()
            .await
            .map_err(|e| TranscriptionError::RecognitionFailure {
                cause: format!("Failed to parse response: {}", e),
            })?;

    let no_speech_prob = max_no_speech_prob(&whisper_response.segments);

    if is_no_speech(&whisper_response.text, no_speech_prob) {
        log::info!(
            "Recognizer reported no speech (prob={:?}, text_len={})",
            no_speech_prob,
            whisper_response.text.trim().len()
        );
        return Err(TranscriptionError::NoSpeechDetected);
    }

    log::info!(
        "Transcription successful: {} chars (no_speech_prob={:?})",
        whisper_response.text.len(),
        no_speech_prob
    );

    Ok(TranscriptionResult {
        text: whisper_response.text,
        no_speech_prob,
    })
}

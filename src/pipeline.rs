//! End-to-end orchestration: finalize, gate, transcribe.
//!
//! `transcribe_buffer` and `transcribe_upload` wire the capture sources
//! through the scoped temp-file primitive so the WAV file is removed on every
//! exit path, with the removal armed before the network call begins.

use crate::audio::buffer::AudioBuffer;
use crate::audio::scoped::{with_scoped_audio_file, ScopedWavFile};
use crate::audio::vad::{self, SpeechStats};
use crate::audio::wav::{finalize_buffer_to_wav, finalize_upload_to_wav, FinalizeError};
use crate::enhancement::{self, EnhancementError};
use crate::settings::PipelineSettings;
use crate::transcription::{self, TranscriptionError, TranscriptionResult};

/// Minimum VAD speech frames for a short clip to be worth a recognition call.
const SHORT_CLIP_MIN_SPEECH_FRAMES: usize = 2;
/// Above this crest factor a short clip is treated as transient noise.
const SHORT_CLIP_MAX_CREST_FACTOR: f32 = 15.0;

/// Errors surfaced at the interaction boundary. All recoverable: the user
/// re-records, re-uploads, or re-triggers the action.
#[derive(Debug)]
pub enum PipelineError {
    Finalize(FinalizeError),
    Transcription(TranscriptionError),
    Enhancement(EnhancementError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Finalize(e) => write!(f, "{}", e),
            PipelineError::Transcription(e) => write!(f, "{}", e),
            PipelineError::Enhancement(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Finalize(e) => Some(e),
            PipelineError::Transcription(e) => Some(e),
            PipelineError::Enhancement(e) => Some(e),
        }
    }
}

impl From<FinalizeError> for PipelineError {
    fn from(e: FinalizeError) -> Self {
        PipelineError::Finalize(e)
    }
}

impl From<TranscriptionError> for PipelineError {
    fn from(e: TranscriptionError) -> Self {
        PipelineError::Transcription(e)
    }
}

impl From<EnhancementError> for PipelineError {
    fn from(e: EnhancementError) -> Self {
        PipelineError::Enhancement(e)
    }
}

/// Which check decided that a clip contained no speech.
#[derive(Debug, Clone, Copy)]
pub enum NoSpeechSource {
    DurationGate,
    LocalVad,
    Recognizer,
}

impl NoSpeechSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoSpeechSource::DurationGate => "duration",
            NoSpeechSource::LocalVad => "vad",
            NoSpeechSource::Recognizer => "recognizer",
        }
    }
}

/// Should a short clip be sent to the recognizer at all?
fn short_clip_has_speech(stats: &SpeechStats) -> bool {
    stats.speech_frames >= SHORT_CLIP_MIN_SPEECH_FRAMES
        && stats.crest_factor() <= SHORT_CLIP_MAX_CREST_FACTOR
}

/// Local gating before any file or network cost is paid.
///
/// Returns the source that rejected the clip, or `None` to proceed. VAD
/// analysis failures (e.g. unsupported rate) fail open: the recognizer gets
/// the final say.
fn gate_buffer(buffer: &AudioBuffer, settings: &PipelineSettings) -> Option<NoSpeechSource> {
    let duration_ms = buffer.duration_ms();

    if duration_ms < settings.min_transcribe_ms {
        log::info!(
            "Clip too short to transcribe: {} ms < {} ms",
            duration_ms,
            settings.min_transcribe_ms
        );
        return Some(NoSpeechSource::DurationGate);
    }

    if settings.short_clip_vad_enabled && duration_ms < settings.vad_check_max_ms {
        let rate = buffer.sample_rate()?;
        let samples = buffer.concat();
        match vad::analyze_samples_for_speech(&samples, rate, settings.vad_ignore_start_ms) {
            Ok(stats) => {
                if !short_clip_has_speech(&stats) {
                    log::info!(
                        "Short clip gated by local VAD: speech_frames={}/{}, crest={:.1}",
                        stats.speech_frames,
                        stats.total_frames,
                        stats.crest_factor()
                    );
                    return Some(NoSpeechSource::LocalVad);
                }
            }
            Err(e) => {
                log::warn!("VAD analysis skipped ({}); sending clip anyway", e);
            }
        }
    }

    None
}

/// Transcribe a finalized recording session's buffer.
///
/// The buffer is gated locally (duration, then VAD for short clips), encoded
/// into a scoped WAV temp file, and sent to the recognizer. The temp file is
/// removed before this function returns, on every path.
pub async fn transcribe_buffer(
    buffer: &AudioBuffer,
    settings: &PipelineSettings,
) -> Result<TranscriptionResult, PipelineError> {
    if buffer.is_empty() {
        return Err(PipelineError::Finalize(FinalizeError::EmptyBuffer));
    }

    if let Some(source) = gate_buffer(buffer, settings) {
        log::info!("No speech (source={})", source.as_str());
        return Err(PipelineError::Transcription(
            TranscriptionError::NoSpeechDetected,
        ));
    }

    let result = with_scoped_audio_file(
        || {
            finalize_buffer_to_wav(buffer, settings.target_sample_rate)
                .map_err(PipelineError::from)
        },
        |path| async move { transcription::transcribe(&path).await.map_err(PipelineError::from) },
    )
    .await;

    if let Err(PipelineError::Transcription(TranscriptionError::NoSpeechDetected)) = &result {
        log::info!("No speech (source={})", NoSpeechSource::Recognizer.as_str());
    }

    result
}

/// Transcribe an uploaded audio blob.
///
/// The blob is normalized into a scoped canonical WAV (pass-through,
/// re-encode, or full decode) and sent to the recognizer. No local gating:
/// uploads are deliberate, so the recognizer decides whether they contain
/// speech. The temp file is removed before this function returns.
pub async fn transcribe_upload(
    blob: &[u8],
    settings: &PipelineSettings,
) -> Result<TranscriptionResult, PipelineError> {
    with_scoped_audio_file(
        || {
            finalize_upload_to_wav(blob, settings.target_sample_rate).map_err(PipelineError::from)
        },
        |path| async move { transcription::transcribe(&path).await.map_err(PipelineError::from) },
    )
    .await
}

/// Run the enhancement pass over a transcript.
pub async fn enhance_transcript(text: &str) -> Result<String, PipelineError> {
    enhancement::enhance(text).await.map_err(PipelineError::from)
}

/// Transcribe a canonical WAV file the caller already produced.
///
/// The file is consumed: it is removed once the attempt completes,
/// whatever the outcome.
pub async fn transcribe_scoped_file(
    file: ScopedWavFile,
) -> Result<TranscriptionResult, PipelineError> {
    with_scoped_audio_file(
        || Ok(file),
        |path| async move { transcription::transcribe(&path).await.map_err(PipelineError::from) },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::AudioChunk;

    fn silent_buffer(samples: usize, rate: u32) -> AudioBuffer {
        let mut buffer = AudioBuffer::new();
        buffer
            .append(AudioChunk::new(vec![0; samples], rate))
            .unwrap();
        buffer
    }

    #[test]
    fn test_gate_rejects_below_min_duration() {
        let settings = PipelineSettings::default();
        // 100ms at 16kHz, below the 500ms default.
        let buffer = silent_buffer(1600, 16000);
        assert!(matches!(
            gate_buffer(&buffer, &settings),
            Some(NoSpeechSource::DurationGate)
        ));
    }

    #[test]
    fn test_gate_rejects_silent_short_clip_via_vad() {
        let settings = PipelineSettings::default();
        // 1 second of silence at 16kHz: passes the duration gate, fails VAD.
        let buffer = silent_buffer(16000, 16000);
        assert!(matches!(
            gate_buffer(&buffer, &settings),
            Some(NoSpeechSource::LocalVad)
        ));
    }

    #[test]
    fn test_gate_fails_open_on_unsupported_vad_rate() {
        let settings = PipelineSettings::default();
        // 44.1kHz is not a VAD rate; 1s of silence must pass through to the
        // recognizer rather than being mis-gated.
        let buffer = silent_buffer(44100, 44100);
        assert!(gate_buffer(&buffer, &settings).is_none());
    }

    #[test]
    fn test_gate_skips_vad_for_long_clips() {
        let settings = PipelineSettings::default();
        // 2 seconds of silence: longer than vad_check_max_ms, goes through.
        let buffer = silent_buffer(32000, 16000);
        assert!(gate_buffer(&buffer, &settings).is_none());
    }

    #[test]
    fn test_gate_disabled_vad() {
        let settings = PipelineSettings {
            short_clip_vad_enabled: false,
            ..PipelineSettings::default()
        };
        let buffer = silent_buffer(16000, 16000);
        assert!(gate_buffer(&buffer, &settings).is_none());
    }

    #[tokio::test]
    async fn test_transcribe_empty_buffer_is_distinct_error() {
        let settings = PipelineSettings::default();
        let buffer = AudioBuffer::new();
        let err = transcribe_buffer(&buffer, &settings).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Finalize(FinalizeError::EmptyBuffer)
        ));
    }

    #[tokio::test]
    async fn test_transcribe_empty_upload_is_distinct_error() {
        let settings = PipelineSettings::default();
        let err = transcribe_upload(&[], &settings).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Finalize(FinalizeError::EmptyUpload)
        ));
    }

    #[test]
    fn test_short_clip_gating_thresholds() {
        let speechy = SpeechStats {
            total_frames: 30,
            speech_frames: 10,
            total_samples: 16000,
            peak_abs: 8000,
            rms: 2000.0,
            ignored_samples: 0,
        };
        assert!(short_clip_has_speech(&speechy));

        let clicky = SpeechStats {
            rms: 100.0,
            peak_abs: 20000,
            ..speechy.clone()
        };
        assert!(!short_clip_has_speech(&clicky));

        let frameless = SpeechStats {
            speech_frames: 1,
            ..speechy.clone()
        };
        assert!(!short_clip_has_speech(&frameless));
    }

    #[test]
    fn test_no_speech_source_labels() {
        assert_eq!(NoSpeechSource::DurationGate.as_str(), "duration");
        assert_eq!(NoSpeechSource::LocalVad.as_str(), "vad");
        assert_eq!(NoSpeechSource::Recognizer.as_str(), "recognizer");
    }
}

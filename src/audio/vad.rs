//! Local speech detection for short clips.
//!
//! Runs WebRTC VAD over mono PCM16 samples before they are sent to the
//! recognizer, so obvious silence can be rejected without a network call.

use webrtc_vad::{SampleRate, Vad, VadMode};

/// Aggregate statistics from one analysis pass.
#[derive(Debug, Clone)]
pub struct SpeechStats {
    pub total_frames: usize,
    pub speech_frames: usize,
    pub total_samples: u64,
    pub peak_abs: i32,
    pub rms: f32,
    pub ignored_samples: u64,
}

impl SpeechStats {
    pub fn speech_ratio(&self) -> f32 {
        if self.total_frames == 0 {
            return 0.0;
        }
        self.speech_frames as f32 / self.total_frames as f32
    }

    /// Peak-to-RMS ratio. Transient noise (clicks, bumps) has a high crest
    /// factor; sustained speech does not.
    pub fn crest_factor(&self) -> f32 {
        if self.rms <= 0.0 {
            return f32::INFINITY;
        }
        self.peak_abs as f32 / self.rms
    }
}

/// Analyze mono PCM16 samples for speech.
///
/// `ignore_start_ms` skips the leading samples so start-click transients do
/// not count. The sample rate must be one WebRTC VAD supports (8, 16, 32, or
/// 48 kHz); other rates are an error and the caller decides whether to send
/// the clip anyway.
pub fn analyze_samples_for_speech(
    samples: &[i16],
    sample_rate: u32,
    ignore_start_ms: u64,
) -> Result<SpeechStats, String> {
    let rate = SampleRate::try_from(sample_rate as i32)
        .map_err(|_| format!("Unsupported sample rate {} Hz", sample_rate))?;

    // Aggressive mode to minimize false positives on non-speech noise.
    let mut vad = Vad::new_with_rate_and_mode(rate, VadMode::VeryAggressive);

    // WebRTC VAD accepts only 10/20/30ms frames. 30ms keeps overhead low.
    let frame_ms = 30usize;
    let frame_len = (sample_rate as usize * frame_ms) / 1000;
    if frame_len == 0 {
        return Err("Invalid sample rate".to_string());
    }

    let skip = ((sample_rate as u64).saturating_mul(ignore_start_ms) / 1000) as usize;
    let skip = skip.min(samples.len());
    let analyzed = &samples[skip..];

    log::debug!(
        "VAD: {} samples at {} Hz, ignoring first {} samples",
        samples.len(),
        sample_rate,
        skip
    );

    let mut total_frames = 0usize;
    let mut speech_frames = 0usize;
    let mut sum_squares: u128 = 0;
    let mut peak_abs: i32 = 0;

    for sample in analyzed {
        let sample_i32 = i32::from(*sample);
        peak_abs = peak_abs.max(sample_i32.abs());
        sum_squares += sample_i32.pow(2) as u128;
    }

    for frame in analyzed.chunks_exact(frame_len) {
        total_frames += 1;
        if vad.is_voice_segment(frame).unwrap_or(false) {
            speech_frames += 1;
        }
    }

    let total_samples = analyzed.len() as u64;
    let rms = if total_samples > 0 {
        ((sum_squares as f64 / total_samples as f64).sqrt()) as f32
    } else {
        0.0
    };

    let stats = SpeechStats {
        total_frames,
        speech_frames,
        total_samples,
        peak_abs,
        rms,
        ignored_samples: skip as u64,
    };

    log::debug!(
        "VAD: speech_frames={}/{} ratio={:.2} rms={:.0} peak={} crest={:.1}",
        stats.speech_frames,
        stats.total_frames,
        stats.speech_ratio(),
        stats.rms,
        stats.peak_abs,
        stats.crest_factor()
    );

    Ok(stats)
}
